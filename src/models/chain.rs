use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chains the watcher knows how to monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Ethereum,
    Bsc,
    Polygon,
    Solana,
    Bitcoin,
}

/// Ledger model shared by a group of chains. Each family owns one event stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChainFamily {
    Evm,
    Solana,
    Bitcoin,
}

impl ChainKind {
    pub const ALL: [ChainKind; 5] = [
        ChainKind::Ethereum,
        ChainKind::Bsc,
        ChainKind::Polygon,
        ChainKind::Solana,
        ChainKind::Bitcoin,
    ];

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainKind::Ethereum | ChainKind::Bsc | ChainKind::Polygon => ChainFamily::Evm,
            ChainKind::Solana => ChainFamily::Solana,
            ChainKind::Bitcoin => ChainFamily::Bitcoin,
        }
    }

    /// Decimals of the native asset's minor unit (wei, lamport, satoshi).
    pub fn native_decimals(&self) -> u32 {
        match self.family() {
            ChainFamily::Evm => 18,
            ChainFamily::Solana => 9,
            ChainFamily::Bitcoin => 8,
        }
    }

    /// Fractional digits shown in notifications.
    pub fn display_decimals(&self) -> u32 {
        match self.family() {
            ChainFamily::Bitcoin => 8,
            _ => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ethereum",
            ChainKind::Bsc => "bsc",
            ChainKind::Polygon => "polygon",
            ChainKind::Solana => "solana",
            ChainKind::Bitcoin => "bitcoin",
        }
    }

    /// Human readable name used in notification titles
    pub fn display_name(&self) -> &'static str {
        match self {
            ChainKind::Ethereum => "Ethereum",
            ChainKind::Bsc => "BSC",
            ChainKind::Polygon => "Polygon",
            ChainKind::Solana => "Solana",
            ChainKind::Bitcoin => "Bitcoin",
        }
    }

    /// Environment variable that overrides this chain's endpoint.
    pub fn endpoint_env_var(&self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ETH_RPC_URL",
            ChainKind::Bsc => "BSC_RPC_URL",
            ChainKind::Polygon => "POLYGON_RPC_URL",
            ChainKind::Solana => "SOLANA_RPC_URL",
            ChainKind::Bitcoin => "BITCOIN_API_URL",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" | "eth" => Ok(ChainKind::Ethereum),
            "bsc" | "bnb" => Ok(ChainKind::Bsc),
            "polygon" | "matic" => Ok(ChainKind::Polygon),
            "solana" | "sol" => Ok(ChainKind::Solana),
            "bitcoin" | "btc" => Ok(ChainKind::Bitcoin),
            other => Err(format!("Unsupported chain: {}", other)),
        }
    }
}

impl ChainFamily {
    pub const ALL: [ChainFamily; 3] = [ChainFamily::Evm, ChainFamily::Solana, ChainFamily::Bitcoin];
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Evm => f.write_str("evm"),
            ChainFamily::Solana => f.write_str("solana"),
            ChainFamily::Bitcoin => f.write_str("bitcoin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_families() {
        assert_eq!(ChainKind::Ethereum.family(), ChainFamily::Evm);
        assert_eq!(ChainKind::Bsc.family(), ChainFamily::Evm);
        assert_eq!(ChainKind::Polygon.family(), ChainFamily::Evm);
        assert_eq!(ChainKind::Solana.family(), ChainFamily::Solana);
        assert_eq!(ChainKind::Bitcoin.family(), ChainFamily::Bitcoin);
    }

    #[test]
    fn test_chain_decimals() {
        assert_eq!(ChainKind::Polygon.native_decimals(), 18);
        assert_eq!(ChainKind::Solana.native_decimals(), 9);
        assert_eq!(ChainKind::Bitcoin.native_decimals(), 8);
        assert_eq!(ChainKind::Bitcoin.display_decimals(), 8);
        assert_eq!(ChainKind::Ethereum.display_decimals(), 6);
    }

    #[test]
    fn test_chain_kind_serialization() {
        let json = serde_json::to_string(&ChainKind::Bsc).expect("Failed to serialize");
        assert_eq!(json, "\"bsc\"");
        let parsed: ChainKind = serde_json::from_str("\"solana\"").expect("Failed to deserialize");
        assert_eq!(parsed, ChainKind::Solana);
    }

    #[test]
    fn test_chain_kind_from_str() {
        assert_eq!("ETH".parse::<ChainKind>().unwrap(), ChainKind::Ethereum);
        assert_eq!("btc".parse::<ChainKind>().unwrap(), ChainKind::Bitcoin);
        assert!("dogecoin".parse::<ChainKind>().is_err());
    }
}

use serde::{Deserialize, Serialize};

use crate::config::WalletConfig;
use crate::models::ChainKind;

/// A native-asset movement affecting a watched wallet, normalized across chains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Absolute amount in minor units (wei, lamports, satoshi)
    pub value: u128,
    pub value_formatted: String,
    pub chain: ChainKind,
    /// Unix seconds
    pub timestamp: i64,
    /// Block height, or slot for Solana
    pub block_height: u64,
    pub direction: Direction,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

/// What a monitor publishes on its family's event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub wallet: WalletConfig,
    pub transaction: Transaction,
}

/// Final payload handed to a notification sink.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationPayload {
    pub wallet: WalletConfig,
    pub transaction: Transaction,
    pub balance: Option<String>,
}

pub fn explorer_tx_url(explorer: &str, hash: &str) -> String {
    format!("{}/tx/{}", explorer.trim_end_matches('/'), hash)
}

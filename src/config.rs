use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::{ChainFamily, ChainKind};

/// Default config location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub chains: BTreeMap<ChainKind, ChainConfig>,
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telegram delivery settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub message_format: MessageFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Markdown,
    Html,
}

/// Connection info for one chain, shared read-only by that chain's monitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    pub enabled: bool,
    /// JSON-RPC endpoint (EVM chains, Solana)
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Esplora-compatible REST endpoint (Bitcoin)
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    pub native_currency: String,
    /// Block explorer base URL, transaction links are `<explorer>/tx/<hash>`
    pub explorer: String,
}

impl ChainConfig {
    /// The endpoint a monitor for `chain` talks to
    pub fn endpoint(&self, chain: ChainKind) -> Option<&str> {
        match chain.family() {
            ChainFamily::Bitcoin => self.api_url.as_deref(),
            _ => self.rpc_url.as_deref(),
        }
    }
}

/// A monitored wallet. `min_value` only filters notifications, never detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletConfig {
    pub address: String,
    pub chain: ChainKind,
    #[serde(default)]
    pub label: String,
    /// Threshold in whole coins
    #[serde(default)]
    pub min_value: f64,
}

impl WalletConfig {
    /// Label if set, address otherwise
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.address
        } else {
            &self.label
        }
    }
}

/// How far back the Solana monitor reads signature history per poll
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LookbackPolicy {
    /// One page of `history_page_size` signatures
    #[default]
    Fixed,
    /// Keep paging back until the cursor is found or `max_lookback_pages` is reached
    Paginate,
}

/// Polling behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Seconds between poll passes of one chain
    pub poll_interval_seconds: u64,
    /// Retry attempts for a single data-source call
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub retry_delay_seconds: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Signatures (Solana) or transactions (Bitcoin) read per history page
    pub history_page_size: usize,
    pub solana_lookback: LookbackPolicy,
    pub max_lookback_pages: u32,
    /// Capacity of each family's event stream; publishers wait when it is full
    pub event_buffer: usize,
    /// Number of recently delivered events remembered for de-duplication
    pub dedup_window: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
    /// Append log lines to this file instead of stderr
    pub file_path: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            request_timeout_seconds: 30,
            history_page_size: 10,
            solana_lookback: LookbackPolicy::Fixed,
            max_lookback_pages: 5,
            event_buffer: 256,
            dedup_window: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

pub const SAMPLE_CONFIG: &str = r#"# chain-wallet-watcher configuration

[telegram]
bot_token = "123456:replace-me"      # or TELEGRAM_BOT_TOKEN
chat_id = "-1001234567890"           # or TELEGRAM_CHAT_ID
message_format = "markdown"          # markdown | html

[monitoring]
poll_interval_seconds = 30
max_retries = 3
retry_delay_seconds = 5
request_timeout_seconds = 30
history_page_size = 10
solana_lookback = "fixed"            # fixed | paginate
max_lookback_pages = 5
event_buffer = 256
dedup_window = 1024

[logging]
level = "info"                       # error | warn | info | debug | trace
format = "pretty"                    # pretty | json

[chains.ethereum]
enabled = true
rpc_url = "https://eth.llamarpc.com" # or ETH_RPC_URL
chain_id = 1
native_currency = "ETH"
explorer = "https://etherscan.io"

[chains.bsc]
enabled = false
rpc_url = "https://bsc-dataseed.binance.org"
chain_id = 56
native_currency = "BNB"
explorer = "https://bscscan.com"

[chains.polygon]
enabled = false
rpc_url = "https://polygon-rpc.com"
chain_id = 137
native_currency = "POL"
explorer = "https://polygonscan.com"

[chains.solana]
enabled = true
rpc_url = "https://api.mainnet-beta.solana.com"
native_currency = "SOL"
explorer = "https://solscan.io"

[chains.bitcoin]
enabled = true
api_url = "https://blockstream.info/api"
native_currency = "BTC"
explorer = "https://mempool.space"

[[wallets]]
address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"
chain = "ethereum"
label = "Treasury"
min_value = 0.01

[[wallets]]
address = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"
chain = "solana"
label = "Hot wallet"

[[wallets]]
address = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh"
chain = "bitcoin"
label = "Cold storage"
min_value = 0.001
"#;

impl AppConfig {
    /// Resolve the config file path: explicit argument, then `CONFIG_PATH`, then the default
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        match explicit {
            Some(path) => PathBuf::from(path),
            None => env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        }
    }

    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load(explicit_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(explicit_path);
        let mut config = Self::load_from_file(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Ok(chat_id) = env::var("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = chat_id;
        }

        // Endpoints are only overridden for chains that are configured at all
        for (kind, chain) in self.chains.iter_mut() {
            if let Ok(url) = env::var(kind.endpoint_env_var()) {
                match kind.family() {
                    ChainFamily::Bitcoin => chain.api_url = Some(url),
                    _ => chain.rpc_url = Some(url),
                }
            }
        }

        env_override("POLL_INTERVAL", &mut self.monitoring.poll_interval_seconds)?;

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(file_path) = env::var("LOG_FILE_PATH") {
            self.logging.file_path = Some(file_path);
        }

        Ok(())
    }

    /// Validate everything the monitors need. Telegram credentials are
    /// checked separately by [`AppConfig::validate_notifications`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallets.is_empty() {
            return Err(ConfigError::MissingField("at least one wallet must be configured".to_string()));
        }

        for wallet in &self.wallets {
            if wallet.address.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "wallets.address".to_string(),
                    value: format!("{:?}", wallet),
                });
            }
            if !wallet.min_value.is_finite() || wallet.min_value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("wallets.{}.min_value", wallet.display_name()),
                    value: wallet.min_value.to_string(),
                });
            }

            let chain = self.chains.get(&wallet.chain).filter(|c| c.enabled).ok_or_else(|| {
                ConfigError::ChainDisabled {
                    chain: wallet.chain.to_string(),
                    wallet: wallet.display_name().to_string(),
                }
            })?;

            let endpoint = chain.endpoint(wallet.chain).ok_or_else(|| ConfigError::MissingEndpoint {
                chain: wallet.chain.to_string(),
            })?;
            validate_url(endpoint)?;
        }

        if self.monitoring.poll_interval_seconds == 0 || self.monitoring.poll_interval_seconds > 3600 {
            return Err(ConfigError::InvalidValue {
                key: "monitoring.poll_interval_seconds".to_string(),
                value: self.monitoring.poll_interval_seconds.to_string(),
            });
        }

        if self.monitoring.history_page_size == 0 || self.monitoring.history_page_size > 1000 {
            return Err(ConfigError::InvalidValue {
                key: "monitoring.history_page_size".to_string(),
                value: self.monitoring.history_page_size.to_string(),
            });
        }

        if self.monitoring.request_timeout_seconds == 0 || self.monitoring.request_timeout_seconds > 300 {
            return Err(ConfigError::InvalidValue {
                key: "monitoring.request_timeout_seconds".to_string(),
                value: self.monitoring.request_timeout_seconds.to_string(),
            });
        }

        if self.monitoring.event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "monitoring.event_buffer".to_string(),
                value: "0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: self.logging.level.clone(),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                value: self.logging.format.clone(),
            });
        }

        Ok(())
    }

    /// Telegram credentials are required unless notifications are only logged
    pub fn validate_notifications(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingField("telegram.bot_token".to_string()));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(ConfigError::MissingField("telegram.chat_id".to_string()));
        }
        Ok(())
    }

    /// Enabled chain configs, in `ChainKind` order
    pub fn enabled_chains(&self) -> impl Iterator<Item = (ChainKind, &ChainConfig)> + '_ {
        self.chains
            .iter()
            .filter(|(_, chain)| chain.enabled)
            .map(|(kind, chain)| (*kind, chain))
    }

    /// Documented sample configuration
    pub fn sample() -> &'static str {
        SAMPLE_CONFIG
    }
}

fn env_override<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = env::var(key) {
        *target = value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(url.to_string()))
    }
}

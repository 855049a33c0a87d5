use thiserror::Error;

/// Main error type for the wallet watcher
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
}

/// Errors talking to a chain data source (JSON-RPC node or block explorer)
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i64, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("Timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded, retry after {seconds} seconds")]
    RateLimit { seconds: u64 },

    #[error("Block not found: {block_number}")]
    BlockNotFound { block_number: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Errors while turning raw ledger data into transactions
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Block parsing failed: {0}")]
    BlockParsing(String),

    #[error("Amount parsing failed: {0}")]
    AmountParsing(String),

    #[error("Calculation overflow: {0}")]
    Overflow(String),
}

/// Configuration errors, fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Missing endpoint for chain {chain}")]
    MissingEndpoint { chain: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Chain {chain} is not enabled for wallet {wallet}")]
    ChainDisabled { chain: String, wallet: String },
}

/// Delivery failures reported by a notification sink
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Telegram request failed: {0}")]
    Telegram(String),

    #[error("Invalid chat id: {0}")]
    InvalidChat(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Stops the process
    Critical,
    /// Affects a whole chain's detection
    High,
    /// Affects a single wallet or transaction
    Medium,
    /// Mostly informational
    Low,
}

impl WatcherError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WatcherError::Config(_) => ErrorSeverity::Critical,

            WatcherError::Rpc(RpcError::Connection(_)) => ErrorSeverity::High,
            WatcherError::Rpc(RpcError::Method { .. }) => ErrorSeverity::High,

            WatcherError::Rpc(RpcError::Timeout { .. }) => ErrorSeverity::Medium,
            WatcherError::Rpc(RpcError::RateLimit { .. }) => ErrorSeverity::Medium,
            WatcherError::Processing(_) => ErrorSeverity::Medium,
            WatcherError::Notification(_) => ErrorSeverity::Medium,

            WatcherError::Rpc(RpcError::BlockNotFound { .. }) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            WatcherError::Rpc(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl RpcError {
    /// Timeouts, connection failures, rate limits and 5xx responses
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Timeout { .. } | RpcError::RateLimit { .. } | RpcError::Connection(_) => true,
            RpcError::Status { status } => *status >= 500,
            RpcError::Http(e) => e.is_timeout() || e.is_connect(),
            // Nodes behind load balancers can lag on the newest block
            RpcError::BlockNotFound { .. } => true,
            _ => false,
        }
    }

    /// Classify a reqwest error the same way regardless of which client saw it
    pub fn from_request(err: reqwest::Error, timeout_seconds: u64) -> Self {
        if err.is_timeout() {
            RpcError::Timeout { seconds: timeout_seconds }
        } else if err.is_connect() {
            RpcError::Connection(err.to_string())
        } else if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            RpcError::RateLimit { seconds: 60 }
        } else {
            RpcError::Http(err)
        }
    }
}

pub mod blockchain;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod notifications;
pub mod orchestrator;
pub mod retry;

pub use blockchain::RpcClient;
pub use config::{AppConfig, ChainConfig, LoggingConfig, MonitoringConfig, TelegramConfig, WalletConfig};
pub use error::{Result, WatcherError};
pub use events::{Dispatcher, EventBus, EventHandler};
pub use logging::{init_logging, LogContext, MetricsLogger};
pub use models::{ChainFamily, ChainKind, Direction, NotificationPayload, Transaction, TransactionEvent};
pub use monitor::{ChainMonitor, MonitorVariant, PollSummary};
pub use notifications::{LogNotifier, NotificationSink, TelegramNotifier};
pub use orchestrator::Watcher;
pub use retry::{RetryConfig, RetryManager};

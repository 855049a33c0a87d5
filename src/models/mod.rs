pub mod chain;
pub mod transaction;

pub use chain::{ChainFamily, ChainKind};
pub use transaction::{explorer_tx_url, Direction, NotificationPayload, Transaction, TransactionEvent};

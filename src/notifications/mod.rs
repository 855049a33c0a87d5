//! Delivery of detected transactions to the outside world.

pub mod telegram;

use async_trait::async_trait;
use log::info;

use crate::error::NotificationError;
use crate::models::NotificationPayload;

pub use telegram::TelegramNotifier;

/// Where finished payloads go. Failures are reported, never retried here.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotificationError>;
}

/// Writes every payload to the log instead of delivering it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotificationError> {
        let tx = &payload.transaction;
        info!(
            "[{}] {} {} {} (balance: {}) {}",
            tx.chain,
            payload.wallet.display_name(),
            tx.direction.as_str(),
            tx.value_formatted,
            payload.balance.as_deref().unwrap_or("n/a"),
            tx.explorer_url
        );
        Ok(())
    }
}

/// `0x1234...abcd` form of long addresses; short strings pass through
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() < 12 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_address() {
        assert_eq!(
            truncate_address("0x1234567890abcdef1234567890abcdef1234abcd"),
            "0x1234...abcd"
        );
        assert_eq!(truncate_address("Multiple"), "Multiple");
        assert_eq!(truncate_address(""), "");
    }
}

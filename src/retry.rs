use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::config::MonitoringConfig;
use crate::error::WatcherError;
use crate::logging::LogContext;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first call
    pub max_attempts: u32,
    /// Initial delay between retries in seconds
    pub initial_delay_seconds: u64,
    /// Maximum delay between retries in seconds
    pub max_delay_seconds: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add ±10% jitter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_seconds: 5,
            max_delay_seconds: 60,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry policy for data-source calls, from `[monitoring]`
    pub fn from_monitoring(config: &MonitoringConfig) -> Self {
        Self {
            max_attempts: config.max_retries.saturating_add(1),
            initial_delay_seconds: config.retry_delay_seconds,
            ..Self::default()
        }
    }

    /// Single attempt, used where the caller handles failure itself
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_seconds: 0,
            max_delay_seconds: 0,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Retry mechanism with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Execute an operation, retrying recoverable errors only
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, WatcherError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, WatcherError>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempt)
                            .with_duration_ms(started.elapsed().as_millis() as u64)
                            .info(&format!("Recovered after {} attempts", attempt));
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_recoverable() {
                        LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempt)
                            .with_metadata("reason", serde_json::json!("non_recoverable"))
                            .debug(&format!("Non-recoverable error, not retrying: {}", error));
                        return Err(error);
                    }

                    if attempt >= max_attempts {
                        LogContext::new("retry", &self.operation_name)
                            .with_metadata("max_attempts", serde_json::json!(max_attempts))
                            .warn(&format!("All {} attempts failed: {}", max_attempts, error));
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt);
                    LogContext::new("retry", &self.operation_name)
                        .with_retry_count(attempt)
                        .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64))
                        .warn(&format!(
                            "Attempt {} of {} failed ({}), retrying in {:.1}s",
                            attempt,
                            max_attempts,
                            error,
                            delay.as_secs_f64()
                        ));

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate delay before the retry following `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_seconds as f64;
        let exponential_delay = base_delay * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let capped_delay = exponential_delay.min(self.config.max_delay_seconds as f64);

        let final_delay = if self.config.jitter {
            // uniform in [-10%, +10%]
            let jitter = capped_delay * 0.1 * (2.0 * rand::random::<f64>() - 1.0);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, RpcError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_seconds: 0,
            max_delay_seconds: 0,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_retry_config_from_monitoring() {
        let monitoring = MonitoringConfig {
            max_retries: 3,
            retry_delay_seconds: 7,
            ..MonitoringConfig::default()
        };
        let config = RetryConfig::from_monitoring(&monitoring);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_delay_seconds, 7);
        assert_eq!(config.max_delay_seconds, 60);
        assert!(config.jitter);
    }

    #[tokio::test]
    async fn test_retry_manager_success_on_first_attempt() {
        let retry_manager = RetryManager::new("test_operation", instant_config(3));

        let result = retry_manager.execute(|| async { Ok::<i32, WatcherError>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_manager_recovers_from_transient_error() {
        let retry_manager = RetryManager::new("flaky", instant_config(3));
        let calls = AtomicU32::new(0);

        let calls = &calls;
        let result = retry_manager
            .execute(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(WatcherError::Rpc(RpcError::Timeout { seconds: 1 }))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_manager_non_recoverable_error() {
        let retry_manager = RetryManager::new("test_operation", instant_config(3));
        let calls = AtomicU32::new(0);

        let calls = &calls;
        let result = retry_manager
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, WatcherError>(WatcherError::Config(ConfigError::MissingField("x".to_string())))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_manager_gives_up_after_max_attempts() {
        let retry_manager = RetryManager::new("down", instant_config(3));
        let calls = AtomicU32::new(0);

        let calls = &calls;
        let result = retry_manager
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, WatcherError>(WatcherError::Rpc(RpcError::Status { status: 503 }))
            })
            .await;

        assert!(matches!(result, Err(WatcherError::Rpc(RpcError::Status { status: 503 }))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_seconds: 2,
            max_delay_seconds: 30,
            backoff_multiplier: 2.0,
            jitter: false,
        };

        let retry_manager = RetryManager::new("test", config);

        assert_eq!(retry_manager.calculate_delay(1).as_secs(), 2);
        assert_eq!(retry_manager.calculate_delay(2).as_secs(), 4);
        assert_eq!(retry_manager.calculate_delay(3).as_secs(), 8);
        assert_eq!(retry_manager.calculate_delay(6).as_secs(), 30);
    }

    #[test]
    fn test_delay_jitter_stays_within_ten_percent() {
        let retry_manager = RetryManager::new(
            "jitter",
            RetryConfig {
                initial_delay_seconds: 10,
                ..RetryConfig::default()
            },
        );

        for _ in 0..50 {
            let delay = retry_manager.calculate_delay(1).as_secs_f64();
            assert!((9.0..=11.0).contains(&delay), "delay {} out of range", delay);
        }
    }
}

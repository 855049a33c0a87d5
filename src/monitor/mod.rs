//! Per-chain polling lifecycle and the chain-specific detection variants.
//!
//! A [`ChainMonitor`] owns the wallets of one chain, runs one poll pass at
//! a time and publishes normalized [`TransactionEvent`]s on its family's
//! event stream. A full stream holds the pass back until the handler
//! catches up, events are never dropped. What a pass actually does is decided by the
//! [`MonitorVariant`] it wraps.

pub mod bitcoin;
pub mod evm;
pub mod solana;

#[cfg(test)]
pub(crate) mod testing;

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::blockchain::{EsploraClient, EvmClient, SolanaClient};
use crate::config::{ChainConfig, MonitoringConfig, WalletConfig};
use crate::error::{ConfigError, ProcessingError, Result};
use crate::format::{format_units, min_value_units};
use crate::logging::{LogContext, MetricsLogger};
use crate::models::{explorer_tx_url, ChainFamily, ChainKind, Direction, Transaction, TransactionEvent};
use crate::retry::RetryConfig;

pub use bitcoin::BitcoinMonitor;
pub use evm::EvmMonitor;
pub use solana::{SolanaHistory, SolanaMonitor};

/// Chain identity and read-only connection info shared by a monitor's variant
#[derive(Debug, Clone)]
pub struct ChainContext {
    pub chain: ChainKind,
    pub config: ChainConfig,
}

/// A wallet-relevant movement before normalization
#[derive(Debug, Clone)]
pub struct Detected {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: u128,
    pub direction: Direction,
    /// `None` when the source did not report one (unconfirmed, pruned)
    pub timestamp: Option<i64>,
    pub block_height: u64,
}

impl ChainContext {
    pub fn new(chain: ChainKind, config: ChainConfig) -> Self {
        Self { chain, config }
    }

    pub fn symbol(&self) -> &str {
        &self.config.native_currency
    }

    /// Decimal rendering of minor units at the chain's display precision
    pub fn format_amount(&self, value: u128) -> String {
        format_units(value, self.chain.native_decimals(), self.chain.display_decimals())
    }

    /// The wallet's `min_value` in minor units
    pub fn min_units(&self, wallet: &WalletConfig) -> std::result::Result<u128, ProcessingError> {
        min_value_units(wallet.min_value, self.chain.native_decimals())
    }

    pub fn normalize(&self, detected: Detected) -> Transaction {
        Transaction {
            explorer_url: explorer_tx_url(&self.config.explorer, &detected.hash),
            value_formatted: format!("{} {}", self.format_amount(detected.value), self.symbol()),
            hash: detected.hash,
            from: detected.from,
            to: detected.to,
            value: detected.value,
            chain: self.chain,
            timestamp: detected.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp()),
            block_height: detected.block_height,
            direction: detected.direction,
        }
    }
}

/// Chain-specific detection, selected by chain family
pub enum MonitorVariant {
    Evm(EvmMonitor),
    Solana(SolanaMonitor),
    Bitcoin(BitcoinMonitor),
}

impl MonitorVariant {
    /// Build the variant for `chain` backed by its HTTP client
    pub fn from_config(chain: ChainKind, chain_config: &ChainConfig, monitoring: &MonitoringConfig) -> Result<Self> {
        let endpoint = chain_config.endpoint(chain).ok_or_else(|| ConfigError::MissingEndpoint {
            chain: chain.to_string(),
        })?;
        let retry = RetryConfig::from_monitoring(monitoring);
        let timeout = monitoring.request_timeout_seconds;
        let ctx = ChainContext::new(chain, chain_config.clone());

        let variant = match chain.family() {
            ChainFamily::Evm => {
                let client = EvmClient::new(endpoint, timeout, retry)?;
                MonitorVariant::Evm(EvmMonitor::new(ctx, Arc::new(client)))
            }
            ChainFamily::Solana => {
                let client = SolanaClient::new(endpoint, timeout, retry)?;
                MonitorVariant::Solana(SolanaMonitor::new(ctx, Arc::new(client), SolanaHistory::from(monitoring)))
            }
            ChainFamily::Bitcoin => {
                let client = EsploraClient::new(endpoint, timeout, retry)?;
                MonitorVariant::Bitcoin(BitcoinMonitor::new(ctx, Arc::new(client), monitoring.history_page_size))
            }
        };
        Ok(variant)
    }

    pub fn context(&self) -> &ChainContext {
        match self {
            MonitorVariant::Evm(m) => m.context(),
            MonitorVariant::Solana(m) => m.context(),
            MonitorVariant::Bitcoin(m) => m.context(),
        }
    }

    pub fn chain(&self) -> ChainKind {
        self.context().chain
    }

    /// New emit-worthy transactions for `wallet` since the previous check
    pub async fn check_wallet(&self, wallet: &WalletConfig) -> Result<Vec<Transaction>> {
        match self {
            MonitorVariant::Evm(m) => m.check_wallet(wallet).await,
            MonitorVariant::Solana(m) => m.check_wallet(wallet).await,
            MonitorVariant::Bitcoin(m) => m.check_wallet(wallet).await,
        }
    }

    /// Native balance in minor units
    pub async fn balance(&self, address: &str) -> Result<u128> {
        match self {
            MonitorVariant::Evm(m) => m.balance(address).await,
            MonitorVariant::Solana(m) => m.balance(address).await.map(u128::from),
            MonitorVariant::Bitcoin(m) => m.balance(address).await,
        }
    }
}

/// Outcome of one poll pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub wallets_checked: usize,
    pub failures: usize,
    pub emitted: usize,
}

struct MonitorState {
    variant: MonitorVariant,
    wallets: Vec<WalletConfig>,
    poll_interval: Duration,
    running: AtomicBool,
    /// Held for the whole pass; a tick that finds it taken is skipped
    pass_guard: tokio::sync::Mutex<()>,
    events: mpsc::Sender<TransactionEvent>,
}

impl MonitorState {
    async fn poll_once(&self) -> Option<PollSummary> {
        let chain = self.variant.chain();
        let Ok(_pass) = self.pass_guard.try_lock() else {
            debug!("{} poll pass still in flight, skipping tick", chain);
            return None;
        };

        let started = Instant::now();
        let mut summary = PollSummary::default();

        for wallet in &self.wallets {
            summary.wallets_checked += 1;
            match self.variant.check_wallet(wallet).await {
                Ok(transactions) => {
                    for transaction in transactions {
                        MetricsLogger::log_transaction_detected(wallet.display_name(), &transaction);
                        summary.emitted += 1;
                        let event = TransactionEvent {
                            wallet: wallet.clone(),
                            transaction,
                        };
                        if self.events.send(event).await.is_err() {
                            debug!("{:?} event stream closed, event dropped", chain.family());
                        }
                    }
                }
                Err(e) => {
                    summary.failures += 1;
                    LogContext::new("monitor", "check_wallet")
                        .with_chain(chain)
                        .with_address(&wallet.address)
                        .with_metadata("severity", serde_json::json!(format!("{:?}", e.severity())))
                        .error(&format!("Error checking wallet {}: {}", wallet.display_name(), e));
                }
            }
        }

        MetricsLogger::log_poll_pass(
            chain,
            summary.wallets_checked,
            summary.failures,
            summary.emitted,
            started.elapsed().as_millis() as u64,
        );
        Some(summary)
    }
}

/// Polling lifecycle for one chain
pub struct ChainMonitor {
    state: Arc<MonitorState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChainMonitor {
    pub fn new(
        variant: MonitorVariant,
        wallets: Vec<WalletConfig>,
        poll_interval: Duration,
        events: mpsc::Sender<TransactionEvent>,
    ) -> Self {
        Self {
            state: Arc::new(MonitorState {
                variant,
                wallets,
                poll_interval,
                running: AtomicBool::new(false),
                pass_guard: tokio::sync::Mutex::new(()),
                events,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn chain(&self) -> ChainKind {
        self.state.variant.chain()
    }

    pub fn native_currency(&self) -> &str {
        self.state.variant.context().symbol()
    }

    pub fn wallets(&self) -> &[WalletConfig] {
        &self.state.wallets
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Run one pass immediately, then keep polling every `poll_interval`.
    /// Calling it on a running monitor only logs a warning.
    pub async fn start(&self) {
        let chain = self.chain();
        if self.state.running.swap(true, Ordering::SeqCst) {
            warn!("{} monitor is already running", chain);
            return;
        }

        info!("Starting {} monitor for {} wallet(s)", chain, self.state.wallets.len());
        self.state.poll_once().await;

        if !self.is_running() {
            // stopped during the initial pass
            return;
        }

        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(state.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately and the initial pass already ran
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !state.running.load(Ordering::SeqCst) {
                    break;
                }
                state.poll_once().await;
            }
        });

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Stop polling. Safe to call repeatedly or on a monitor that never started.
    pub fn stop(&self) {
        let was_running = self.state.running.swap(false, Ordering::SeqCst);
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = task {
            handle.abort();
        }
        if was_running {
            info!("Stopped {} monitor", self.chain());
        }
    }

    /// One pass over every wallet. `None` if a pass was already in flight.
    pub async fn poll_once(&self) -> Option<PollSummary> {
        self.state.poll_once().await
    }

    /// Current balance as a decimal string
    pub async fn try_balance(&self, address: &str) -> Result<String> {
        let value = self.state.variant.balance(address).await?;
        Ok(self.state.variant.context().format_amount(value))
    }

    /// Best-effort balance; `"0"` when the lookup fails
    pub async fn get_balance(&self, address: &str) -> String {
        match self.try_balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                LogContext::new("monitor", "get_balance")
                    .with_chain(self.chain())
                    .with_address(address)
                    .warn(&format!("Balance lookup failed: {}", e));
                "0".to_string()
            }
        }
    }
}

impl Drop for ChainMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{bitcoin_context, btc_tx, wallet, FakeBitcoin};
    use super::*;
    use crate::blockchain::BitcoinSource;

    const A: &str = "bc1qwalleta";
    const B: &str = "bc1qwalletb";
    const EXT: &str = "bc1qexternal";

    fn bitcoin_monitor(fake: &Arc<FakeBitcoin>, interval: Duration) -> (ChainMonitor, mpsc::Receiver<TransactionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let variant = MonitorVariant::Bitcoin(BitcoinMonitor::new(
            bitcoin_context(),
            Arc::clone(fake) as Arc<dyn BitcoinSource>,
            10,
        ));
        let monitor = ChainMonitor::new(
            variant,
            vec![wallet(A, ChainKind::Bitcoin, 0.0), wallet(B, ChainKind::Bitcoin, 0.0)],
            interval,
            tx,
        );
        (monitor, rx)
    }

    #[test]
    fn test_normalize_formats_value_and_link() {
        let tx = bitcoin_context().normalize(Detected {
            hash: "abc".to_string(),
            from: "x".to_string(),
            to: "y".to_string(),
            value: 20_000_000,
            direction: Direction::Outgoing,
            timestamp: Some(5),
            block_height: 1,
        });
        assert_eq!(tx.value_formatted, "0.20000000 BTC");
        assert_eq!(tx.explorer_url, "https://mempool.space/tx/abc");
        assert_eq!(tx.timestamp, 5);
    }

    #[test]
    fn test_normalize_falls_back_to_now() {
        let before = chrono::Utc::now().timestamp();
        let tx = bitcoin_context().normalize(Detected {
            hash: "abc".to_string(),
            from: String::new(),
            to: String::new(),
            value: 0,
            direction: Direction::Incoming,
            timestamp: None,
            block_height: 0,
        });
        assert!(tx.timestamp >= before);
    }

    #[tokio::test]
    async fn test_failing_wallet_does_not_stop_others() {
        let fake = Arc::new(FakeBitcoin::default());
        let (monitor, mut rx) = bitcoin_monitor(&fake, Duration::from_secs(3600));

        // seed both wallets
        let summary = monitor.poll_once().await.unwrap();
        assert_eq!(summary, PollSummary { wallets_checked: 2, failures: 0, emitted: 0 });

        fake.fail_address(A);
        fake.push(B, btc_tx("t1", &[(EXT, 100_000)], &[(B, 90_000)], Some(1)));

        let summary = monitor.poll_once().await.unwrap();
        assert_eq!(summary, PollSummary { wallets_checked: 2, failures: 1, emitted: 1 });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.wallet.address, B);
        assert_eq!(event.transaction.hash, "t1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_stream_holds_the_pass_back() {
        let fake = Arc::new(FakeBitcoin::default());
        let (tx, mut rx) = mpsc::channel(1);
        let variant = MonitorVariant::Bitcoin(BitcoinMonitor::new(
            bitcoin_context(),
            Arc::clone(&fake) as Arc<dyn BitcoinSource>,
            10,
        ));
        let monitor = Arc::new(ChainMonitor::new(
            variant,
            vec![wallet(A, ChainKind::Bitcoin, 0.0)],
            Duration::from_secs(3600),
            tx,
        ));
        monitor.poll_once().await.unwrap();
        for id in ["t1", "t2", "t3"] {
            fake.push(A, btc_tx(id, &[(EXT, 1_000)], &[(A, 1_000)], Some(1)));
        }

        let pass = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.poll_once().await })
        };
        let mut hashes = Vec::new();
        while let Some(event) = rx.recv().await {
            hashes.push(event.transaction.hash);
            if hashes.len() == 3 {
                break;
            }
        }

        assert_eq!(hashes, vec!["t3", "t2", "t1"]);
        assert_eq!(pass.await.unwrap().map(|s| s.emitted), Some(3));
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let fake = Arc::new(FakeBitcoin::default());
        let (monitor, _rx) = bitcoin_monitor(&fake, Duration::from_secs(3600));
        let monitor = Arc::new(monitor);
        let gate = fake.gate();

        let first = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.poll_once().await })
        };
        while fake.calls() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(monitor.poll_once().await, None);

        gate.notify_one();
        gate.notify_one();
        // wallet B's request also waits on the gate
        let summary = first.await.unwrap();
        assert_eq!(summary.map(|s| s.wallets_checked), Some(2));
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let fake = Arc::new(FakeBitcoin::default());
        let (monitor, _rx) = bitcoin_monitor(&fake, Duration::from_secs(3600));

        monitor.stop();
        assert!(!monitor.is_running());

        monitor.start().await;
        assert!(monitor.is_running());
        assert_eq!(fake.calls(), 2);

        // second start neither polls nor spawns again
        monitor.start().await;
        assert_eq!(fake.calls(), 2);

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_keeps_polling_after_errors() {
        let fake = Arc::new(FakeBitcoin::default());
        fake.fail_address(A);
        fake.fail_address(B);
        let (monitor, _rx) = bitcoin_monitor(&fake, Duration::from_secs(30));

        monitor.start().await;
        assert_eq!(fake.calls(), 2);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(fake.calls(), 8);

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fake.calls(), 8);
    }

    #[tokio::test]
    async fn test_balance_sentinel_on_failure() {
        let fake = Arc::new(FakeBitcoin::default());
        let (monitor, _rx) = bitcoin_monitor(&fake, Duration::from_secs(3600));

        assert_eq!(monitor.get_balance(A).await, "0");
        assert!(monitor.try_balance(A).await.is_err());

        fake.set_stats(
            serde_json::from_value(serde_json::json!({
                "chain_stats": {"funded_txo_sum": 150_000_000u64, "spent_txo_sum": 25_000_000u64},
                "mempool_stats": {"funded_txo_sum": 0, "spent_txo_sum": 0}
            }))
            .unwrap(),
        );
        assert_eq!(monitor.get_balance(A).await, "1.25000000");
    }
}

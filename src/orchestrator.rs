use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, WalletConfig};
use crate::error::Result;
use crate::events::{Dispatcher, EventBus, EventHandler};
use crate::models::ChainKind;
use crate::monitor::{ChainMonitor, MonitorVariant};
use crate::notifications::NotificationSink;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns every chain monitor and the event dispatcher
pub struct Watcher {
    monitors: Vec<Arc<ChainMonitor>>,
    bus: EventBus,
    sink: Arc<dyn NotificationSink>,
    dedup_window: usize,
    event_buffer: usize,
    dispatcher: Option<Dispatcher>,
}

impl Watcher {
    /// One monitor per enabled chain that has at least one wallet.
    /// Client construction errors are returned, nothing is started yet.
    pub fn from_config(config: &AppConfig, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let monitoring = &config.monitoring;
        let bus = EventBus::new(monitoring.event_buffer);
        let poll_interval = Duration::from_secs(monitoring.poll_interval_seconds);

        let mut by_chain = group_wallets(&config.wallets);
        let mut monitors = Vec::new();

        for (chain, chain_config) in config.enabled_chains() {
            let Some(wallets) = by_chain.remove(&chain) else {
                continue;
            };
            let variant = MonitorVariant::from_config(chain, chain_config, monitoring)?;
            info!("Initialized {} monitor for {} wallet(s)", chain, wallets.len());
            monitors.push(Arc::new(ChainMonitor::new(
                variant,
                wallets,
                poll_interval,
                bus.sender(chain.family()),
            )));
        }

        for (chain, wallets) in by_chain {
            warn!(
                "{} wallet(s) on {} ignored, chain is not enabled",
                wallets.len(),
                chain
            );
        }

        Ok(Self {
            monitors,
            bus,
            sink,
            dedup_window: monitoring.dedup_window,
            event_buffer: monitoring.event_buffer,
            dispatcher: None,
        })
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    pub fn chains(&self) -> Vec<ChainKind> {
        self.monitors.iter().map(|m| m.chain()).collect()
    }

    pub fn monitor(&self, chain: ChainKind) -> Option<&Arc<ChainMonitor>> {
        self.monitors.iter().find(|m| m.chain() == chain)
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Start delivering events, then start every monitor
    pub async fn start(&mut self) {
        if self.dispatcher.is_some() {
            warn!("Watcher is already running");
            return;
        }

        let by_chain: HashMap<ChainKind, Arc<ChainMonitor>> =
            self.monitors.iter().map(|m| (m.chain(), Arc::clone(m))).collect();
        let handler = EventHandler::new(by_chain, Arc::clone(&self.sink), self.dedup_window);
        self.dispatcher = Some(Dispatcher::spawn(&mut self.bus, handler, self.event_buffer));

        for monitor in &self.monitors {
            monitor.start().await;
        }
        info!("Wallet watcher running with {} chain monitor(s)", self.monitors.len());
    }

    /// Stop every monitor, then let queued notifications drain
    pub async fn shutdown(&mut self) {
        for monitor in &self.monitors {
            monitor.stop();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown(SHUTDOWN_GRACE).await;
        }
        info!("Shutdown complete");
    }
}

/// Configured wallets keyed by chain, in configuration order
pub fn group_wallets(wallets: &[WalletConfig]) -> BTreeMap<ChainKind, Vec<WalletConfig>> {
    let mut grouped: BTreeMap<ChainKind, Vec<WalletConfig>> = BTreeMap::new();
    for wallet in wallets {
        grouped.entry(wallet.chain).or_default().push(wallet.clone());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::monitor::testing::{chain_config, wallet};
    use crate::notifications::LogNotifier;

    fn config(chains: &[(ChainKind, bool)], wallets: Vec<WalletConfig>) -> AppConfig {
        let mut config: AppConfig = toml::from_str("").unwrap();
        config.chains = chains
            .iter()
            .map(|(kind, enabled)| {
                let chain = ChainConfig {
                    enabled: *enabled,
                    ..chain_config("X", "https://explorer.example")
                };
                (*kind, chain)
            })
            .collect();
        config.wallets = wallets;
        config
    }

    #[test]
    fn test_group_wallets_keeps_order() {
        let grouped = group_wallets(&[
            wallet("0xa", ChainKind::Ethereum, 0.0),
            wallet("sol1", ChainKind::Solana, 0.0),
            wallet("0xb", ChainKind::Ethereum, 0.0),
        ]);
        let eth: Vec<&str> = grouped[&ChainKind::Ethereum].iter().map(|w| w.address.as_str()).collect();
        assert_eq!(eth, vec!["0xa", "0xb"]);
        assert_eq!(grouped[&ChainKind::Solana].len(), 1);
        assert!(!grouped.contains_key(&ChainKind::Bitcoin));
    }

    #[test]
    fn test_only_enabled_chains_with_wallets_get_monitors() {
        let config = config(
            &[
                (ChainKind::Ethereum, true),
                (ChainKind::Bsc, true),
                (ChainKind::Solana, false),
                (ChainKind::Bitcoin, true),
            ],
            vec![
                wallet("0xa", ChainKind::Ethereum, 0.0),
                wallet("sol1", ChainKind::Solana, 0.0),
                wallet("bc1q", ChainKind::Bitcoin, 0.0),
            ],
        );

        let watcher = Watcher::from_config(&config, Arc::new(LogNotifier)).unwrap();

        assert_eq!(watcher.chains(), vec![ChainKind::Ethereum, ChainKind::Bitcoin]);
        assert!(watcher.monitor(ChainKind::Bsc).is_none());
        assert!(watcher.monitor(ChainKind::Solana).is_none());
        assert_eq!(watcher.monitor(ChainKind::Bitcoin).unwrap().native_currency(), "X");
    }

    #[test]
    fn test_missing_endpoint_is_an_error() {
        let mut config = config(&[(ChainKind::Polygon, true)], vec![wallet("0xa", ChainKind::Polygon, 0.0)]);
        if let Some(polygon) = config.chains.get_mut(&ChainKind::Polygon) {
            polygon.rpc_url = None;
        }
        assert!(Watcher::from_config(&config, Arc::new(LogNotifier)).is_err());
    }

    #[test]
    fn test_no_wallets_means_no_monitors() {
        let config = config(&[(ChainKind::Ethereum, true)], Vec::new());
        let watcher = Watcher::from_config(&config, Arc::new(LogNotifier)).unwrap();
        assert_eq!(watcher.monitor_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let config = config(&[(ChainKind::Ethereum, true)], Vec::new());
        let mut watcher = Watcher::from_config(&config, Arc::new(LogNotifier)).unwrap();
        assert!(!watcher.is_running());
        watcher.shutdown().await;
        assert!(!watcher.is_running());
    }
}

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::blockchain::{SignatureInfo, SolanaSource, SolanaTransaction};
use crate::config::{LookbackPolicy, MonitoringConfig, WalletConfig};
use crate::error::Result;
use crate::models::{Direction, Transaction};

use super::{ChainContext, Detected};

/// How much signature history one poll reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolanaHistory {
    pub page_size: usize,
    pub lookback: LookbackPolicy,
    pub max_pages: u32,
}

impl From<&MonitoringConfig> for SolanaHistory {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            page_size: config.history_page_size,
            lookback: config.solana_lookback,
            max_pages: config.max_lookback_pages,
        }
    }
}

impl SolanaHistory {
    fn page_limit(&self) -> u32 {
        match self.lookback {
            LookbackPolicy::Fixed => 1,
            LookbackPolicy::Paginate => self.max_pages.max(1),
        }
    }
}

/// Signature-history scanner for SOL balance changes.
///
/// The per-wallet cursor is the newest signature seen. A wallet with an
/// entry but no signature was seeded while its history was empty.
pub struct SolanaMonitor {
    ctx: ChainContext,
    source: Arc<dyn SolanaSource>,
    history: SolanaHistory,
    last_seen: Mutex<HashMap<String, Option<String>>>,
}

impl SolanaMonitor {
    pub fn new(ctx: ChainContext, source: Arc<dyn SolanaSource>, history: SolanaHistory) -> Self {
        Self {
            ctx,
            source,
            history,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &ChainContext {
        &self.ctx
    }

    /// `None` before the first successful poll of `address`
    pub fn cursor(&self, address: &str) -> Option<Option<String>> {
        self.cursors().get(address).cloned()
    }

    fn cursors(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<String>>> {
        self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn balance(&self, address: &str) -> Result<u64> {
        self.source.balance(address).await
    }

    /// New balance changes of `wallet` since its cursor.
    ///
    /// The cursor always moves to the newest signature read. A signature whose
    /// transaction cannot be fetched, or that the node does not serve yet
    /// (common under `confirmed` commitment), is skipped and never rechecked.
    pub async fn check_wallet(&self, wallet: &WalletConfig) -> Result<Vec<Transaction>> {
        let address = wallet.address.as_str();

        let Some(cursor) = self.cursor(address) else {
            let latest = self.source.signatures(address, self.history.page_size, None).await?;
            let newest = latest.first().map(|s| s.signature.clone());
            info!(
                "[{}] {} starts after signature {}",
                self.ctx.chain,
                wallet.display_name(),
                newest.as_deref().unwrap_or("<none>")
            );
            self.cursors().insert(address.to_string(), newest);
            return Ok(Vec::new());
        };

        let (fresh, newest) = self.fetch_since(address, cursor.as_deref()).await?;
        let min_value = self.ctx.min_units(wallet)?;
        let mut found = Vec::new();

        for info in fresh.iter().filter(|s| !s.failed()) {
            match self.source.transaction(&info.signature).await {
                Ok(Some(tx)) => {
                    if let Some(transaction) = self.balance_change(wallet, info, &tx, min_value) {
                        found.push(transaction);
                    }
                }
                Ok(None) => warn!("Solana transaction {} is not available yet, skipping", info.signature),
                Err(e) => error!("Error processing Solana transaction {}: {}", info.signature, e),
            }
        }

        if newest.is_some() {
            self.cursors().insert(address.to_string(), newest);
        }
        Ok(found)
    }

    /// Signatures strictly newer than `cursor` (newest first) and the newest signature fetched
    async fn fetch_since(&self, address: &str, cursor: Option<&str>) -> Result<(Vec<SignatureInfo>, Option<String>)> {
        let page_size = self.history.page_size;
        let page_limit = self.history.page_limit();
        let mut fresh: Vec<SignatureInfo> = Vec::new();
        let mut newest = None;
        let mut before: Option<String> = None;

        for page in 1..=page_limit {
            let batch = self.source.signatures(address, page_size, before.as_deref()).await?;
            if newest.is_none() {
                newest = batch.first().map(|s| s.signature.clone());
            }

            let fetched = batch.len();
            let mut reached_cursor = false;
            for info in batch {
                if cursor == Some(info.signature.as_str()) {
                    reached_cursor = true;
                    break;
                }
                fresh.push(info);
            }

            if reached_cursor || fetched < page_size {
                return Ok((fresh, newest));
            }
            if page == page_limit {
                if self.history.lookback == LookbackPolicy::Paginate {
                    warn!(
                        "Solana lookback for {} stopped after {} pages without reaching the last seen signature",
                        address, page_limit
                    );
                }
                break;
            }
            before = fresh.last().map(|s| s.signature.clone());
        }

        Ok((fresh, newest))
    }

    fn balance_change(
        &self,
        wallet: &WalletConfig,
        info: &SignatureInfo,
        tx: &SolanaTransaction,
        min_value: u128,
    ) -> Option<Transaction> {
        let deltas = tx.balance_deltas();
        let Some(&(_, delta)) = deltas.iter().find(|(key, _)| *key == wallet.address) else {
            debug!("{} is not an account of {}, skipping", wallet.address, info.signature);
            return None;
        };

        if delta == 0 {
            return None;
        }
        let value = delta.unsigned_abs();
        if value < min_value {
            return None;
        }

        // the account that moved the most in the opposite direction
        let counterparty = deltas
            .iter()
            .filter(|(key, d)| *key != wallet.address && d.signum() == -delta.signum())
            .max_by_key(|(_, d)| d.unsigned_abs())
            .map(|(key, _)| key.to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let (direction, from, to) = if delta > 0 {
            (Direction::Incoming, counterparty, wallet.address.clone())
        } else {
            (Direction::Outgoing, wallet.address.clone(), counterparty)
        };

        Some(self.ctx.normalize(Detected {
            hash: info.signature.clone(),
            from,
            to,
            value,
            direction,
            timestamp: info.block_time.or(tx.block_time),
            block_height: info.slot,
        }))
    }
}

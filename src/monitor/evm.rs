use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::blockchain::EvmSource;
use crate::config::WalletConfig;
use crate::error::Result;
use crate::models::{Direction, Transaction};

use super::{ChainContext, Detected};

/// Block-range scanner for native transfers on an EVM chain.
///
/// Cursor per wallet is the last fully scanned block. It only moves after a
/// whole `(cursor, head]` range was read, so a failed scan is retried from
/// the same place on the next pass.
pub struct EvmMonitor {
    ctx: ChainContext,
    source: Arc<dyn EvmSource>,
    last_scanned: Mutex<HashMap<String, u64>>,
}

impl EvmMonitor {
    pub fn new(ctx: ChainContext, source: Arc<dyn EvmSource>) -> Self {
        Self {
            ctx,
            source,
            last_scanned: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &ChainContext {
        &self.ctx
    }

    pub fn cursor(&self, address: &str) -> Option<u64> {
        self.cursors().get(&address.to_lowercase()).copied()
    }

    fn cursors(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.last_scanned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn balance(&self, address: &str) -> Result<u128> {
        self.source.balance(address).await
    }

    pub async fn check_wallet(&self, wallet: &WalletConfig) -> Result<Vec<Transaction>> {
        let key = wallet.address.to_lowercase();
        let head = self.source.block_number().await?;

        let Some(last) = self.cursor(&key) else {
            self.cursors().insert(key, head);
            info!(
                "[{}] {} starts at block {}",
                self.ctx.chain,
                wallet.display_name(),
                head
            );
            return Ok(Vec::new());
        };

        if head <= last {
            return Ok(Vec::new());
        }

        debug!(
            "Checking {} blocks {} to {} for {}",
            self.ctx.chain,
            last + 1,
            head,
            wallet.display_name()
        );

        let min_value = self.ctx.min_units(wallet)?;
        let mut found = Vec::new();

        for number in (last + 1)..=head {
            let block = self.source.block_with_transactions(number).await?;
            let timestamp = block.timestamp_secs()?;

            for tx in &block.transactions {
                let to = tx.to.as_deref().unwrap_or_default();
                let direction = if to.eq_ignore_ascii_case(&key) {
                    Direction::Incoming
                } else if tx.from.eq_ignore_ascii_case(&key) {
                    Direction::Outgoing
                } else {
                    continue;
                };

                let value = tx.value_wei()?;
                if value < min_value {
                    continue;
                }

                found.push(self.ctx.normalize(Detected {
                    hash: tx.hash.clone(),
                    from: tx.from.clone(),
                    to: to.to_string(),
                    value,
                    direction,
                    timestamp: Some(timestamp),
                    block_height: number,
                }));
            }
        }

        self.cursors().insert(key, head);
        Ok(found)
    }
}

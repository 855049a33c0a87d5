use log::info;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::blockchain::{BitcoinSource, EsploraTx};
use crate::config::WalletConfig;
use crate::error::Result;
use crate::models::{Direction, Transaction};

use super::{ChainContext, Detected};

/// Address-history scanner for BTC net balance changes.
///
/// Each wallet remembers every txid it has processed. Anything on a later
/// page that is not remembered is new, so an older txid sliding back onto
/// the page (an evicted or replaced mempool tx) is never reported again.
pub struct BitcoinMonitor {
    ctx: ChainContext,
    source: Arc<dyn BitcoinSource>,
    page_size: usize,
    known: Mutex<HashMap<String, HashSet<String>>>,
}

impl BitcoinMonitor {
    pub fn new(ctx: ChainContext, source: Arc<dyn BitcoinSource>, page_size: usize) -> Self {
        Self {
            ctx,
            source,
            page_size,
            known: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &ChainContext {
        &self.ctx
    }

    pub fn known_count(&self, address: &str) -> Option<usize> {
        self.known_sets().get(address).map(HashSet::len)
    }

    fn known_sets(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<String>>> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Confirmed plus mempool balance in satoshi
    pub async fn balance(&self, address: &str) -> Result<u128> {
        Ok(self.source.address_stats(address).await?.balance_sats())
    }

    pub async fn check_wallet(&self, wallet: &WalletConfig) -> Result<Vec<Transaction>> {
        let address = wallet.address.as_str();
        let mut page = self.source.address_txs(address).await?;
        page.truncate(self.page_size);
        let page_ids: HashSet<String> = page.iter().map(|tx| tx.txid.clone()).collect();

        let seeded = self.known_sets().contains_key(address);
        if !seeded {
            info!(
                "[{}] {} starts with {} known transaction(s)",
                self.ctx.chain,
                wallet.display_name(),
                page_ids.len()
            );
            self.known_sets().insert(address.to_string(), page_ids);
            return Ok(Vec::new());
        }

        let min_value = self.ctx.min_units(wallet)?;
        let mut sets = self.known_sets();
        let known = sets.entry(address.to_string()).or_default();
        let found = page
            .iter()
            .filter(|tx| !known.contains(&tx.txid))
            .filter_map(|tx| self.net_change(address, tx, min_value))
            .collect();

        // ids are only ever added, one wallet's history stays small
        known.extend(page_ids);
        Ok(found)
    }

    fn net_change(&self, address: &str, tx: &EsploraTx, min_value: u128) -> Option<Transaction> {
        let spent: u128 = tx
            .vin
            .iter()
            .filter_map(|input| input.prevout.as_ref())
            .filter(|prevout| prevout.pays(address))
            .map(|prevout| prevout.value as u128)
            .sum();
        let received: u128 = tx
            .vout
            .iter()
            .filter(|output| output.pays(address))
            .map(|output| output.value as u128)
            .sum();

        let net = received as i128 - spent as i128;
        let value = net.unsigned_abs();
        if value < min_value {
            return None;
        }

        let direction = if net < 0 { Direction::Outgoing } else { Direction::Incoming };
        let (from, to) = match direction {
            Direction::Incoming => {
                let senders = tx
                    .vin
                    .iter()
                    .filter_map(|input| input.prevout.as_ref())
                    .filter_map(|prevout| prevout.scriptpubkey_address.as_deref());
                (counterparty(address, senders), address.to_string())
            }
            Direction::Outgoing => {
                let recipients = tx.vout.iter().filter_map(|output| output.scriptpubkey_address.as_deref());
                (address.to_string(), counterparty(address, recipients))
            }
        };

        Some(self.ctx.normalize(Detected {
            hash: tx.txid.clone(),
            from,
            to,
            value,
            direction,
            timestamp: tx.status.block_time,
            block_height: tx.status.block_height.unwrap_or(0),
        }))
    }
}

/// The single external address, `"Multiple"` or `"Unknown"`
fn counterparty<'a>(wallet: &str, addresses: impl Iterator<Item = &'a str>) -> String {
    let external: BTreeSet<&str> = addresses.filter(|a| *a != wallet).collect();
    match external.len() {
        0 => "Unknown".to_string(),
        1 => external.into_iter().next().unwrap_or("Unknown").to_string(),
        _ => "Multiple".to_string(),
    }
}

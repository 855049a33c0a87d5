//! In-memory data sources for monitor tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::blockchain::bitcoin_client::{TxInput, TxOutput, TxStatus};
use crate::blockchain::solana_client::{TransactionBody, TransactionMessage, TransactionMeta};
use crate::blockchain::{
    AddressStats, BitcoinSource, EsploraTx, EvmBlock, EvmSource, EvmTransaction, SignatureInfo, SolanaSource,
    SolanaTransaction,
};
use crate::config::{ChainConfig, WalletConfig};
use crate::error::{Result, RpcError};
use crate::models::ChainKind;

use super::ChainContext;

pub fn chain_config(symbol: &str, explorer: &str) -> ChainConfig {
    ChainConfig {
        enabled: true,
        rpc_url: Some("http://127.0.0.1:1".to_string()),
        api_url: Some("http://127.0.0.1:1".to_string()),
        chain_id: None,
        native_currency: symbol.to_string(),
        explorer: explorer.to_string(),
    }
}

pub fn evm_context() -> ChainContext {
    ChainContext::new(ChainKind::Ethereum, chain_config("ETH", "https://etherscan.io"))
}

pub fn solana_context() -> ChainContext {
    ChainContext::new(ChainKind::Solana, chain_config("SOL", "https://solscan.io"))
}

pub fn bitcoin_context() -> ChainContext {
    ChainContext::new(ChainKind::Bitcoin, chain_config("BTC", "https://mempool.space"))
}

pub fn wallet(address: &str, chain: ChainKind, min_value: f64) -> WalletConfig {
    WalletConfig {
        address: address.to_string(),
        chain,
        label: String::new(),
        min_value,
    }
}

// EVM

pub fn evm_block(number: u64, transactions: Vec<EvmTransaction>) -> EvmBlock {
    EvmBlock {
        number: format!("0x{:x}", number),
        timestamp: format!("0x{:x}", 1_700_000_000 + number),
        transactions,
    }
}

pub fn evm_tx(hash: &str, from: &str, to: &str, value: u128) -> EvmTransaction {
    EvmTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: Some(to.to_string()),
        value: format!("0x{:x}", value),
    }
}

pub struct FakeEvm {
    head: Mutex<u64>,
    blocks: Mutex<HashMap<u64, EvmBlock>>,
    fetched: Mutex<Vec<u64>>,
    pub balance: u128,
}

impl FakeEvm {
    pub fn with_head(head: u64) -> Self {
        Self {
            head: Mutex::new(head),
            blocks: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
            balance: 0,
        }
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn add_block(&self, block: EvmBlock) {
        let number = u64::from_str_radix(block.number.trim_start_matches("0x"), 16).unwrap();
        self.blocks.lock().unwrap().insert(number, block);
    }

    pub fn fetched_blocks(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvmSource for FakeEvm {
    async fn block_number(&self) -> Result<u64> {
        Ok(*self.head.lock().unwrap())
    }

    async fn block_with_transactions(&self, number: u64) -> Result<EvmBlock> {
        self.fetched.lock().unwrap().push(number);
        let block = self.blocks.lock().unwrap().get(&number).cloned();
        Ok(block.ok_or(RpcError::BlockNotFound { block_number: number })?)
    }

    async fn balance(&self, _address: &str) -> Result<u128> {
        Ok(self.balance)
    }
}

// Solana

pub fn signature(sig: &str, slot: u64) -> SignatureInfo {
    SignatureInfo {
        signature: sig.to_string(),
        slot,
        err: None,
        block_time: Some(1_700_000_000 + slot as i64),
    }
}

pub fn sol_tx(slot: u64, keys: &[&str], pre: &[u64], post: &[u64]) -> SolanaTransaction {
    SolanaTransaction {
        slot,
        block_time: None,
        meta: Some(TransactionMeta {
            err: None,
            pre_balances: pre.to_vec(),
            post_balances: post.to_vec(),
            loaded_addresses: None,
        }),
        transaction: TransactionBody {
            signatures: Vec::new(),
            message: TransactionMessage {
                account_keys: keys.iter().map(|k| k.to_string()).collect(),
            },
        },
    }
}

#[derive(Default)]
pub struct FakeSolana {
    /// Newest first
    history: Mutex<Vec<SignatureInfo>>,
    transactions: Mutex<HashMap<String, SolanaTransaction>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(usize, Option<String>)>>,
    fail_history: Mutex<bool>,
    pub balance: u64,
}

impl FakeSolana {
    /// Record a new signature on top of the history
    pub fn push(&self, info: SignatureInfo, tx: Option<SolanaTransaction>) {
        if let Some(tx) = tx {
            self.transactions.lock().unwrap().insert(info.signature.clone(), tx);
        }
        self.history.lock().unwrap().insert(0, info);
    }

    pub fn fail_transaction(&self, sig: &str) {
        self.failing.lock().unwrap().insert(sig.to_string());
    }

    pub fn fail_history(&self, fail: bool) {
        *self.fail_history.lock().unwrap() = fail;
    }

    pub fn requests(&self) -> Vec<(usize, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SolanaSource for FakeSolana {
    async fn signatures(&self, _address: &str, limit: usize, before: Option<&str>) -> Result<Vec<SignatureInfo>> {
        self.requests.lock().unwrap().push((limit, before.map(str::to_string)));
        if *self.fail_history.lock().unwrap() {
            return Err(RpcError::Timeout { seconds: 1 }.into());
        }

        let history = self.history.lock().unwrap();
        let start = match before {
            Some(before) => match history.iter().position(|s| s.signature == before) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(history.iter().skip(start).take(limit).cloned().collect())
    }

    async fn transaction(&self, sig: &str) -> Result<Option<SolanaTransaction>> {
        if self.failing.lock().unwrap().contains(sig) {
            return Err(RpcError::Connection("reset".to_string()).into());
        }
        Ok(self.transactions.lock().unwrap().get(sig).cloned())
    }

    async fn balance(&self, _address: &str) -> Result<u64> {
        Ok(self.balance)
    }
}

// Bitcoin

pub fn btc_tx(txid: &str, inputs: &[(&str, u64)], outputs: &[(&str, u64)], height: Option<u64>) -> EsploraTx {
    EsploraTx {
        txid: txid.to_string(),
        status: TxStatus {
            confirmed: height.is_some(),
            block_height: height,
            block_time: height.map(|h| 1_231_006_505 + h as i64 * 600),
        },
        vin: inputs
            .iter()
            .map(|(address, value)| TxInput {
                prevout: Some(TxOutput {
                    scriptpubkey_address: Some(address.to_string()),
                    value: *value,
                }),
            })
            .collect(),
        vout: outputs
            .iter()
            .map(|(address, value)| TxOutput {
                scriptpubkey_address: Some(address.to_string()),
                value: *value,
            })
            .collect(),
    }
}

#[derive(Default)]
pub struct FakeBitcoin {
    txs: Mutex<HashMap<String, Vec<EsploraTx>>>,
    failing: Mutex<HashSet<String>>,
    stats: Mutex<Option<AddressStats>>,
    gate: Mutex<Option<Arc<Notify>>>,
    pub calls: AtomicUsize,
}

impl FakeBitcoin {
    /// Record a new transaction on top of the address history
    pub fn push(&self, address: &str, tx: EsploraTx) {
        self.txs.lock().unwrap().entry(address.to_string()).or_default().insert(0, tx);
    }

    /// Drop a transaction from the history, as an evicted mempool tx would be
    pub fn remove(&self, address: &str, txid: &str) {
        if let Some(txs) = self.txs.lock().unwrap().get_mut(address) {
            txs.retain(|tx| tx.txid != txid);
        }
    }

    pub fn fail_address(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn set_stats(&self, stats: AddressStats) {
        *self.stats.lock().unwrap() = Some(stats);
    }

    /// Make every history request wait until the returned handle is notified
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BitcoinSource for FakeBitcoin {
    async fn address_txs(&self, address: &str) -> Result<Vec<EsploraTx>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().unwrap().contains(address) {
            return Err(RpcError::Status { status: 502 }.into());
        }
        Ok(self.txs.lock().unwrap().get(address).cloned().unwrap_or_default())
    }

    async fn address_stats(&self, address: &str) -> Result<AddressStats> {
        if self.failing.lock().unwrap().contains(address) {
            return Err(RpcError::Status { status: 502 }.into());
        }
        self.stats
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RpcError::InvalidResponse("no stats".to_string()).into())
    }
}

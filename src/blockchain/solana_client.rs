use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::retry::RetryConfig;

use super::rpc_client::RpcClient;

/// Read access to Solana account history
#[async_trait]
pub trait SolanaSource: Send + Sync {
    /// Signatures touching `address`, newest first, strictly older than `before` when set
    async fn signatures(&self, address: &str, limit: usize, before: Option<&str>) -> Result<Vec<SignatureInfo>>;
    /// `None` when the node no longer (or not yet) has the transaction
    async fn transaction(&self, signature: &str) -> Result<Option<SolanaTransaction>>;
    /// Balance in lamports
    async fn balance(&self, address: &str) -> Result<u64>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub block_time: Option<i64>,
}

impl SignatureInfo {
    pub fn failed(&self) -> bool {
        self.err.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

/// Address-table lookups of versioned transactions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionBody {
    #[serde(default)]
    pub signatures: Vec<String>,
    pub message: TransactionMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub account_keys: Vec<String>,
}

impl SolanaTransaction {
    /// Account list in balance order: static keys, then loaded writable, then loaded readonly
    pub fn account_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.transaction.message.account_keys.iter().map(String::as_str).collect();
        if let Some(loaded) = self.meta.as_ref().and_then(|m| m.loaded_addresses.as_ref()) {
            keys.extend(loaded.writable.iter().map(String::as_str));
            keys.extend(loaded.readonly.iter().map(String::as_str));
        }
        keys
    }

    /// Signed lamport change per account, aligned with [`SolanaTransaction::account_keys`]
    pub fn balance_deltas(&self) -> Vec<(&str, i128)> {
        let Some(meta) = self.meta.as_ref() else {
            return Vec::new();
        };
        self.account_keys()
            .into_iter()
            .zip(meta.pre_balances.iter().zip(meta.post_balances.iter()))
            .map(|(key, (pre, post))| (key, *post as i128 - *pre as i128))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    value: u64,
}

/// Solana JSON-RPC client, reads at `confirmed` commitment
pub struct SolanaClient {
    rpc: RpcClient,
}

impl SolanaClient {
    pub fn new(endpoint: &str, timeout_seconds: u64, retry: RetryConfig) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::new(endpoint, timeout_seconds, retry)?,
        })
    }
}

#[async_trait]
impl SolanaSource for SolanaClient {
    async fn signatures(&self, address: &str, limit: usize, before: Option<&str>) -> Result<Vec<SignatureInfo>> {
        let mut options = json!({ "limit": limit, "commitment": "confirmed" });
        if let Some(before) = before {
            options["before"] = json!(before);
        }
        self.rpc.call("getSignaturesForAddress", vec![json!(address), options]).await
    }

    async fn transaction(&self, signature: &str) -> Result<Option<SolanaTransaction>> {
        self.rpc
            .call(
                "getTransaction",
                vec![
                    json!(signature),
                    json!({
                        "encoding": "json",
                        "maxSupportedTransactionVersion": 0,
                        "commitment": "confirmed"
                    }),
                ],
            )
            .await
    }

    async fn balance(&self, address: &str) -> Result<u64> {
        let response: BalanceResponse = self
            .rpc
            .call("getBalance", vec![json!(address), json!({ "commitment": "confirmed" })])
            .await?;
        Ok(response.value)
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Instant;

use crate::error::{Result, RpcError};
use crate::logging::{LogContext, MetricsLogger};
use crate::retry::{RetryConfig, RetryManager};

use super::rpc_client::{build_http_client, status_error};

/// Read access to an Esplora-compatible explorer
#[async_trait]
pub trait BitcoinSource: Send + Sync {
    /// Latest transactions touching `address`, newest first (mempool first)
    async fn address_txs(&self, address: &str) -> Result<Vec<EsploraTx>>;
    async fn address_stats(&self, address: &str) -> Result<AddressStats>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraTx {
    pub txid: String,
    pub status: TxStatus,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxInput {
    /// Absent for coinbase inputs
    #[serde(default)]
    pub prevout: Option<TxOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

impl TxOutput {
    pub fn pays(&self, address: &str) -> bool {
        self.scriptpubkey_address.as_deref() == Some(address)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressStats {
    pub chain_stats: TxoStats,
    pub mempool_stats: TxoStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxoStats {
    pub funded_txo_sum: u64,
    pub spent_txo_sum: u64,
}

impl AddressStats {
    /// Confirmed plus mempool balance in satoshi
    pub fn balance_sats(&self) -> u128 {
        let funded = self.chain_stats.funded_txo_sum as i128 + self.mempool_stats.funded_txo_sum as i128;
        let spent = self.chain_stats.spent_txo_sum as i128 + self.mempool_stats.spent_txo_sum as i128;
        (funded - spent).max(0) as u128
    }
}

/// Esplora REST client (`GET /address/{addr}` and `/address/{addr}/txs`)
pub struct EsploraClient {
    client: Client,
    base_url: String,
    timeout_seconds: u64,
    retry: RetryManager,
}

impl EsploraClient {
    pub fn new(base_url: &str, timeout_seconds: u64, retry: RetryConfig) -> Result<Self> {
        LogContext::new("esplora_client", "initialization")
            .with_metadata("endpoint", serde_json::json!(base_url))
            .debug("Initializing explorer client");

        Ok(Self {
            client: build_http_client(timeout_seconds)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_seconds,
            retry: RetryManager::new("esplora_get", retry),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let url = url.as_str();
        self.retry
            .execute(move || async move {
                let started = Instant::now();
                let result = self.fetch(url).await;
                MetricsLogger::log_rpc_call(path, started.elapsed().as_millis() as u64, result.is_ok());
                result
            })
            .await
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RpcError::from_request(e, self.timeout_seconds))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status).into());
        }

        Ok(response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(format!("{}: {}", url, e)))?)
    }
}

#[async_trait]
impl BitcoinSource for EsploraClient {
    async fn address_txs(&self, address: &str) -> Result<Vec<EsploraTx>> {
        self.get(&format!("/address/{}/txs", address)).await
    }

    async fn address_stats(&self, address: &str) -> Result<AddressStats> {
        self.get(&format!("/address/{}", address)).await
    }
}

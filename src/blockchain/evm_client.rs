use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ProcessingError, Result, RpcError};
use crate::format::{parse_hex_u128, parse_hex_u64};
use crate::logging::LogContext;
use crate::retry::RetryConfig;

use super::rpc_client::RpcClient;

/// Read access to an EVM chain
#[async_trait]
pub trait EvmSource: Send + Sync {
    /// Current head height
    async fn block_number(&self) -> Result<u64>;
    /// Block with full transaction bodies
    async fn block_with_transactions(&self, number: u64) -> Result<EvmBlock>;
    /// Native balance in wei
    async fn balance(&self, address: &str) -> Result<u128>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmBlock {
    pub number: String,
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<EvmTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmTransaction {
    pub hash: String,
    pub from: String,
    /// Absent for contract creation
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: String,
}

impl EvmBlock {
    pub fn timestamp_secs(&self) -> std::result::Result<i64, ProcessingError> {
        let ts = parse_hex_u64(&self.timestamp)?;
        i64::try_from(ts).map_err(|_| ProcessingError::Overflow(format!("block timestamp {}", ts)))
    }
}

impl EvmTransaction {
    pub fn value_wei(&self) -> std::result::Result<u128, ProcessingError> {
        parse_hex_u128(&self.value)
    }
}

/// `eth_*` JSON-RPC client
pub struct EvmClient {
    rpc: RpcClient,
}

impl EvmClient {
    pub fn new(endpoint: &str, timeout_seconds: u64, retry: RetryConfig) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::new(endpoint, timeout_seconds, retry)?,
        })
    }
}

#[async_trait]
impl EvmSource for EvmClient {
    async fn block_number(&self) -> Result<u64> {
        let hex: String = self.rpc.call("eth_blockNumber", vec![]).await?;
        Ok(parse_hex_u64(&hex)?)
    }

    async fn block_with_transactions(&self, number: u64) -> Result<EvmBlock> {
        let block: Option<EvmBlock> = self
            .rpc
            .call("eth_getBlockByNumber", vec![json!(format!("0x{:x}", number)), json!(true)])
            .await?;

        let block = block.ok_or(RpcError::BlockNotFound { block_number: number })?;

        LogContext::new("evm_client", "get_block")
            .with_block_number(number)
            .with_metadata("transaction_count", json!(block.transactions.len()))
            .trace(&format!("Retrieved block {} with {} transactions", number, block.transactions.len()));

        Ok(block)
    }

    async fn balance(&self, address: &str) -> Result<u128> {
        let hex: String = self.rpc.call("eth_getBalance", vec![json!(address), json!("latest")]).await?;
        Ok(parse_hex_u128(&hex)?)
    }
}

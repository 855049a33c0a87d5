use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::{Result, RpcError, WatcherError};
use crate::logging::{LogContext, MetricsLogger};
use crate::retry::{RetryConfig, RetryManager};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Build the pooled HTTP client shared by every data-source client
pub fn build_http_client(timeout_seconds: u64) -> std::result::Result<Client, RpcError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .map_err(RpcError::Http)
}

/// Map a non-success HTTP status onto the error taxonomy
pub fn status_error(status: reqwest::StatusCode) -> RpcError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        RpcError::RateLimit { seconds: 60 }
    } else {
        RpcError::Status { status: status.as_u16() }
    }
}

/// JSON-RPC 2.0 transport over HTTP POST
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    timeout_seconds: u64,
    retry: RetryManager,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout_seconds: u64, retry: RetryConfig) -> Result<Self> {
        LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", serde_json::json!(endpoint))
            .with_metadata("timeout_seconds", serde_json::json!(timeout_seconds))
            .debug("Initializing RPC client");

        Ok(Self {
            client: build_http_client(timeout_seconds)?,
            endpoint: endpoint.to_string(),
            timeout_seconds,
            retry: RetryManager::new("rpc_call", retry),
        })
    }

    /// Call `method` and deserialize its `result`, retrying transient failures
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let params = params.as_slice();
        let value = self.retry.execute(move || self.request(method, params)).await?;
        serde_json::from_value(value).map_err(|e| {
            WatcherError::Rpc(RpcError::InvalidResponse(format!("{} returned unexpected shape: {}", method, e)))
        })
    }

    /// A single round trip. A JSON `null` result is returned as `Value::Null`.
    async fn request(&self, method: &str, params: &[Value]) -> Result<Value> {
        let started = Instant::now();
        let result = self.send(method, params).await;
        MetricsLogger::log_rpc_call(method, started.elapsed().as_millis() as u64, result.is_ok());
        result
    }

    async fn send(&self, method: &str, params: &[Value]) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::from_request(e, self.timeout_seconds))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status).into());
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(format!("{}: {}", method, e)))?;

        if let Some(error) = rpc_response.error {
            let rpc_error = match error.code {
                // -32005 is the common "limit exceeded" code across node providers
                -32005 => RpcError::RateLimit { seconds: 10 },
                -32700 | -32600 | -32602 => {
                    RpcError::InvalidResponse(format!("{} (code {})", error.message, error.code))
                }
                code => RpcError::Method { code, message: error.message },
            };
            return Err(rpc_error.into());
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }
}

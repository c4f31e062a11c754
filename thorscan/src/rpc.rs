// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Node RPC client
//!
//! Two endpoints back the scanner: the consensus JSON-RPC (status and
//! per-height block results) and the node's REST API for decoded block
//! transactions. Transient transport failures are retried a bounded number
//! of times here; RPC-level error objects are surfaced as data so the
//! scanner can classify them.

use crate::error::{ScanError, ScanResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::warn;

/// Node status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub latest_height: u64,
}

/// The two request kinds the scanner issues, plus the status endpoint
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn status(&self) -> ScanResult<NodeStatus>;

    /// Transaction results and end-of-block events at a height
    async fn block_results(&self, height: u64) -> ScanResult<Value>;

    /// Decoded block transactions at a height
    async fn block_txs(&self, height: u64) -> ScanResult<Value>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Value,
}

#[derive(Clone, Debug)]
pub struct NodeRpcClient {
    http_client: reqwest::Client,
    rpc_url: String,
    api_url: String,
    request_id: Arc<AtomicU64>,
}

const MAX_TRANSPORT_ATTEMPTS: usize = 3;

impl NodeRpcClient {
    pub fn new(rpc_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        fn shared_http_client() -> reqwest::Client {
            static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
            CLIENT
                .get_or_init(|| {
                    reqwest::Client::builder()
                        .pool_max_idle_per_host(16)
                        .tcp_keepalive(Some(Duration::from_secs(30)))
                        .connect_timeout(Duration::from_secs(2))
                        .timeout(Duration::from_secs(30))
                        .build()
                        .expect("Failed to build reqwest client")
                })
                .clone()
        }

        Self {
            http_client: shared_http_client(),
            rpc_url: rpc_url.into(),
            api_url: api_url.into(),
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn call(&self, method: &str, params: Value) -> ScanResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        };

        let mut last_transport_err = None;

        for attempt in 0..MAX_TRANSPORT_ATTEMPTS {
            let response = match self
                .http_client
                .post(&self.rpc_url)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt + 1 < MAX_TRANSPORT_ATTEMPTS && is_transient_transport_error(&err) {
                        warn!(
                            "[RPC] transport error calling {} (attempt {}/{}), retrying",
                            method,
                            attempt + 1,
                            MAX_TRANSPORT_ATTEMPTS
                        );
                        last_transport_err = Some(err.to_string());
                        tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                        continue;
                    }
                    return Err(ScanError::Transport(err.to_string()));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ScanError::Transport(format!("HTTP {status}: {body}")));
            }

            let rpc_response: JsonRpcResponse = response
                .json()
                .await
                .map_err(|e| ScanError::InvalidResponse(e.to_string()))?;

            if let Some(error) = rpc_response.error {
                let data = match &error.data {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                return Err(ScanError::Rpc {
                    code: error.code,
                    message: error.message,
                    data,
                });
            }

            return Ok(rpc_response.result.unwrap_or(Value::Null));
        }

        Err(ScanError::Transport(
            last_transport_err.unwrap_or_else(|| "RPC call failed after retries".to_string()),
        ))
    }

    async fn get(&self, path: &str) -> ScanResult<Value> {
        let url = format!("{}{}", self.api_url.trim_end_matches('/'), path);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScanError::Transport(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ScanError::InvalidResponse(e.to_string()))?;

        // the REST gateway reports errors as {"code": N, "message": "..."}
        if !status.is_success() {
            let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return Err(ScanError::Rpc {
                code,
                message: message.clone(),
                data: message,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl NodeRpc for NodeRpcClient {
    async fn status(&self) -> ScanResult<NodeStatus> {
        let result = self.call("status", json!({})).await?;
        let latest_height = result
            .get("sync_info")
            .and_then(|si| si.get("latest_block_height"))
            .and_then(|h| {
                h.as_u64()
                    .or_else(|| h.as_str().and_then(|s| s.parse().ok()))
            })
            .ok_or_else(|| {
                ScanError::InvalidResponse("status: missing latest_block_height".to_string())
            })?;
        Ok(NodeStatus { latest_height })
    }

    async fn block_results(&self, height: u64) -> ScanResult<Value> {
        self.call("block_results", json!({"height": height.to_string()}))
            .await
    }

    async fn block_txs(&self, height: u64) -> ScanResult<Value> {
        self.get(&format!("/cosmos/tx/v1beta1/txs/block/{height}"))
            .await
    }
}

fn is_transient_transport_error(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("connection closed")
        || msg.contains("connection reset")
        || msg.contains("broken pipe")
        || msg.contains("unexpected eof")
        || msg.contains("incomplete")
}

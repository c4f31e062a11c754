// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! One fetched block and the behind/ahead error classification
//!
//! When the node retires or has not yet produced a requested height, the
//! RPC error detail embeds the last available height as the final run of
//! decimal digits in a human-readable message. That substring extraction is
//! the sole mechanism for behind/ahead classification.

use crate::decode::NativeTx;
use crate::error::ScanError;
use crate::events::RawEvent;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::error;

/// RPC error code the node uses for height-not-available conditions
pub const HEIGHT_NOT_AVAILABLE_CODE: i64 = -32603;

/// Per-transaction execution result from the block results endpoint
#[derive(Debug, Clone, Default)]
pub struct TxResult {
    pub code: u32,
    pub events: Vec<RawEvent>,
    pub error_message: String,
}

/// One decoded block, or a classified fetch error
#[derive(Debug, Clone, Default)]
pub struct BlockResult {
    pub height: u64,
    pub txs: Vec<NativeTx>,
    pub tx_results: Vec<TxResult>,
    pub end_block_events: Vec<RawEvent>,
    pub is_error: bool,
    pub error_code: i64,
    pub error_message: String,
    /// Highest height the node currently serves; only meaningful on error
    pub last_available_block: u64,
}

impl BlockResult {
    /// Requested height has not been produced yet
    pub fn is_ahead(&self) -> bool {
        self.last_available_block != 0 && self.height > self.last_available_block
    }

    /// Requested height has been retired by the node
    pub fn is_behind(&self) -> bool {
        self.last_available_block != 0 && self.height < self.last_available_block
    }

    /// Classify an RPC error into a `BlockResult` error marker.
    /// Height extraction only applies to the height-not-available code.
    pub fn from_rpc_error(height: u64, code: i64, message: &str, data: &str) -> Self {
        let last_available_block = if code == HEIGHT_NOT_AVAILABLE_CODE {
            last_run_of_digits(data).unwrap_or(0)
        } else {
            0
        };

        Self {
            height,
            is_error: true,
            error_code: code,
            error_message: format!("{message}/{data}"),
            last_available_block,
            ..Default::default()
        }
    }

    /// Build from the block-results payload:
    /// `{"result": {"txs_results": [...], "finalize_block_events": [...]}}`.
    /// Transactions stay empty until `fill_transactions` is called.
    pub fn load(payload: &Value, height: u64) -> Self {
        let result = payload.get("result").unwrap_or(payload);

        let tx_results = result
            .get("txs_results")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(|tr| load_tx_result(tr, height)).collect())
            .unwrap_or_default();

        let end_block_events = result
            .get("finalize_block_events")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|ev| load_event(ev, height)).collect())
            .unwrap_or_default();

        Self {
            height,
            tx_results,
            end_block_events,
            ..Default::default()
        }
    }

    /// Attach decoded transactions and copy result codes onto them.
    /// The node reports one result per transaction in block order.
    pub fn fill_transactions(&mut self, txs: Vec<NativeTx>) -> Result<(), ScanError> {
        if txs.len() != self.tx_results.len() {
            return Err(ScanError::Decode(format!(
                "block #{}: txs and results count mismatch ({} vs {})",
                self.height,
                txs.len(),
                self.tx_results.len()
            )));
        }

        self.txs = txs;
        for (tx, result) in self.txs.iter_mut().zip(self.tx_results.iter()) {
            tx.code = result.code;
            if result.code != 0 {
                error!(
                    "[Block] Failed tx in block #{}: code={} {}",
                    self.height, result.code, result.error_message
                );
            }
        }
        Ok(())
    }

    /// View with failed transactions filtered out
    pub fn only_successful(mut self) -> Self {
        if self.txs.is_empty() {
            return self;
        }
        self.txs.retain(|tx| tx.is_success());
        self
    }
}

fn load_tx_result(tx_result: &Value, height: u64) -> TxResult {
    let code = tx_result.get("code").and_then(Value::as_u64).unwrap_or(0) as u32;
    if code != 0 {
        return TxResult {
            code,
            events: Vec::new(),
            error_message: tx_result
                .get("log")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        };
    }

    let events = tx_result
        .get("events")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|ev| load_event(ev, height)).collect())
        .unwrap_or_default();

    TxResult {
        code,
        events,
        error_message: String::new(),
    }
}

/// Events arrive either as `{"type": t, "attributes": [{"key","value"}]}`
/// or as a flat object with a `type` key.
fn load_event(event: &Value, height: u64) -> Option<RawEvent> {
    let event_type = event.get("type")?.as_str()?.to_string();
    let mut raw = RawEvent::new(event_type, height);

    if let Some(attr_list) = event.get("attributes").and_then(Value::as_array) {
        for attr in attr_list {
            let key = attr.get("key").and_then(Value::as_str)?;
            let value = attr.get("value").and_then(Value::as_str).unwrap_or("");
            raw.attrs.insert(key.to_string(), value.to_string());
        }
    } else if let Some(obj) = event.as_object() {
        for (key, value) in obj {
            if key == "type" {
                continue;
            }
            if let Some(s) = value.as_str() {
                raw.attrs.insert(key.clone(), s.to_string());
            }
        }
    }

    Some(raw)
}

/// Last run of decimal digits in the given text, if any
pub fn last_run_of_digits(text: &str) -> Option<u64> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").unwrap());
    re.find_iter(text).last().and_then(|m| m.as_str().parse().ok())
}

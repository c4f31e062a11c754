// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Native transaction decoding
//!
//! Parses the node's JSON transaction representation (block-txs endpoint)
//! into typed structures. Only the message kinds the scanner consumes are
//! decoded; everything else becomes `TxMessage::Unknown` and is ignored.

use crate::error::{ScanError, ScanResult};
use crate::types::Coin;
use serde_json::Value;
use tracing::debug;

pub const MSG_DEPOSIT: &str = "/types.MsgDeposit";
pub const MSG_OBSERVED_TX_IN: &str = "/types.MsgObservedTxIn";
pub const MSG_OBSERVED_TX_OUT: &str = "/types.MsgObservedTxOut";

/// A transaction observed on a connected chain and reported inward by the
/// bridging layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTx {
    pub tx_id: String,
    pub chain: String,
    pub from_address: String,
    pub to_address: String,
    pub coins: Vec<Coin>,
    pub memo: String,
}

/// Direction of an observed transaction relative to the network's vaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MsgDeposit {
    pub coins: Vec<Coin>,
    pub memo: String,
    pub signer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TxMessage {
    Deposit(MsgDeposit),
    ObservedTxIn(Vec<ObservedTx>),
    ObservedTxOut(Vec<ObservedTx>),
    Unknown,
}

/// One decoded native transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTx {
    pub hash: String,
    /// Result code, 0 = success. Filled in from the block results.
    pub code: u32,
    pub memo: String,
    pub messages: Vec<TxMessage>,
    pub height: u64,
}

impl NativeTx {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    pub fn deposit(&self) -> Option<&MsgDeposit> {
        self.messages.iter().find_map(|m| match m {
            TxMessage::Deposit(d) => Some(d),
            _ => None,
        })
    }

    /// Observed transactions carried by this native tx, with direction
    pub fn observed_txs(&self) -> impl Iterator<Item = (&ObservedTx, ObservedDirection)> {
        self.messages.iter().flat_map(|m| {
            let (txs, dir): (&[ObservedTx], ObservedDirection) = match m {
                TxMessage::ObservedTxIn(txs) => (txs.as_slice(), ObservedDirection::Inbound),
                TxMessage::ObservedTxOut(txs) => (txs.as_slice(), ObservedDirection::Outbound),
                _ => (&[], ObservedDirection::Inbound),
            };
            txs.iter().map(move |t| (t, dir))
        })
    }
}

/// Decode the whole block-txs payload. The payload shape is
/// `{"txs": [...], "tx_responses": [{"txhash", "code", ...}]}`.
pub fn decode_block_txs(payload: &Value, height: u64) -> ScanResult<Vec<NativeTx>> {
    let txs = payload
        .get("txs")
        .and_then(Value::as_array)
        .ok_or_else(|| ScanError::Decode(format!("block #{height}: missing txs array")))?;

    let responses = payload
        .get("tx_responses")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut decoded = Vec::with_capacity(txs.len());
    for (index, tx) in txs.iter().enumerate() {
        let response = responses.get(index);
        match decode_one_tx(tx, response, height) {
            Some(native) => decoded.push(native),
            None => debug!("[Decode] Skipping undecodable tx #{index} in block #{height}"),
        }
    }
    Ok(decoded)
}

fn decode_one_tx(tx: &Value, response: Option<&Value>, height: u64) -> Option<NativeTx> {
    let body = tx.get("body")?;

    let hash = response
        .and_then(|r| r.get("txhash"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_uppercase();
    let code = response
        .and_then(|r| r.get("code"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;

    let memo = body
        .get("memo")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .map(|msgs| msgs.iter().map(decode_message).collect())
        .unwrap_or_default();

    Some(NativeTx {
        hash,
        code,
        memo,
        messages,
        height,
    })
}

fn decode_message(msg: &Value) -> TxMessage {
    let type_tag = msg.get("@type").and_then(Value::as_str).unwrap_or("");
    match type_tag {
        MSG_DEPOSIT => TxMessage::Deposit(MsgDeposit {
            coins: decode_coins(msg.get("coins")),
            memo: str_field(msg, "memo"),
            signer: str_field(msg, "signer"),
        }),
        MSG_OBSERVED_TX_IN => TxMessage::ObservedTxIn(decode_observed_txs(msg)),
        MSG_OBSERVED_TX_OUT => TxMessage::ObservedTxOut(decode_observed_txs(msg)),
        _ => TxMessage::Unknown,
    }
}

/// Observed messages wrap each reported tx:
/// `{"txs": [{"tx": {"id", "chain", "from_address", "to_address", "coins", "memo"}}]}`
fn decode_observed_txs(msg: &Value) -> Vec<ObservedTx> {
    let Some(entries) = msg.get("txs").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let inner = entry.get("tx")?;
            Some(ObservedTx {
                tx_id: str_field(inner, "id").to_uppercase(),
                chain: str_field(inner, "chain"),
                from_address: str_field(inner, "from_address"),
                to_address: str_field(inner, "to_address"),
                coins: decode_coins(inner.get("coins")),
                memo: str_field(inner, "memo"),
            })
        })
        .collect()
}

fn decode_coins(value: Option<&Value>) -> Vec<Coin> {
    let Some(coins) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    coins
        .iter()
        .filter_map(|c| {
            let asset = coin_asset(c)?;
            let amount = c
                .get("amount")
                .and_then(|a| a.as_str().and_then(|s| s.parse().ok()).or(a.as_u64()))?;
            Some(Coin { amount, asset })
        })
        .collect()
}

// the asset field is either a plain string or `{"chain","symbol","ticker"}`
fn coin_asset(coin: &Value) -> Option<String> {
    let asset = coin.get("asset")?;
    if let Some(s) = asset.as_str() {
        return Some(s.to_string());
    }
    let chain = asset.get("chain")?.as_str()?;
    let symbol = asset.get("symbol")?.as_str()?;
    Some(format!("{chain}.{symbol}"))
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

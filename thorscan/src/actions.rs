// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Finished domain actions
//!
//! A `SwapAction` is the immutable, fully resolved representation of one
//! completed user swap. It is built exactly once per transaction id and is
//! never mutated after construction.

use crate::types::Coin;
use serde::{Deserialize, Serialize};

/// One outbound leg, grouped by destination address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTx {
    pub address: String,
    pub coins: Vec<Coin>,
    pub height: u64,
}

/// Streaming swap progress captured at completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingMeta {
    pub interval: u64,
    pub quantity: u64,
    pub count: u64,
    pub last_height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapAction {
    /// Inbound transaction id
    pub tx_id: String,
    /// Approximate unix timestamp (seconds) of the inbound block
    pub timestamp: f64,
    /// Inbound block height
    pub height: u64,
    pub memo: String,
    pub from_address: String,
    pub in_coin: Coin,
    /// Pools touched, in first-seen order
    pub pools: Vec<String>,
    pub out_txs: Vec<SubTx>,
    /// Total liquidity fee across all swap events, in RUNE base units
    pub liquidity_fee_rune: u64,
    /// Worst slip across all swap events, basis points
    pub slip_bps: u64,
    pub streaming: Option<StreamingMeta>,
    pub volume_usd: f64,
}

impl SwapAction {
    pub fn is_streaming(&self) -> bool {
        self.streaming
            .as_ref()
            .map(|s| s.quantity > 1)
            .unwrap_or(false)
    }
}

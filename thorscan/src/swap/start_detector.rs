// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Swap intent detection
//!
//! Walks a decoded block's deposit messages and inbound observed
//! transactions, keeps the ones whose memo declares a swap, and yields a
//! descriptor per intent. Descriptors reflect intention only; the realized
//! swap may differ (streaming quantity, refunds).

use crate::block::result::BlockResult;
use crate::decode::ObservedDirection;
use crate::memo::Memo;
use crate::prices::PoolPrices;
use crate::types::{is_rune, Coin, NATIVE_RUNE};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One detected swap intent
#[derive(Debug, Clone, PartialEq)]
pub struct SwapStart {
    pub tx_id: String,
    pub from_address: String,
    pub memo: Memo,
    pub memo_str: String,
    pub in_amount: u64,
    pub in_asset: String,
    pub out_asset: String,
    pub is_streaming: bool,
    pub block_height: u64,
    pub volume_usd: f64,
}

pub struct SwapStartDetector {
    prices: Arc<RwLock<PoolPrices>>,
}

impl SwapStartDetector {
    pub fn new(prices: Arc<RwLock<PoolPrices>>) -> Self {
        Self { prices }
    }

    pub async fn detect(&self, block: &BlockResult) -> Vec<SwapStart> {
        let prices = self.prices.read().await.clone();
        self.detect_with(block, &prices)
    }

    /// Detection against a fixed price snapshot
    pub fn detect_with(&self, block: &BlockResult, prices: &PoolPrices) -> Vec<SwapStart> {
        let mut starts = Vec::new();

        for tx in &block.txs {
            if !tx.is_success() {
                continue;
            }

            if let Some(deposit) = tx.deposit() {
                if let Some(start) = make_swap_start(
                    &tx.hash,
                    &deposit.memo,
                    &deposit.coins,
                    &deposit.signer,
                    block.height,
                    prices,
                ) {
                    starts.push(start);
                }
            }

            for (obs, direction) in tx.observed_txs() {
                if direction != ObservedDirection::Inbound {
                    continue;
                }
                if let Some(start) = make_swap_start(
                    &obs.tx_id,
                    &obs.memo,
                    &obs.coins,
                    &obs.from_address,
                    block.height,
                    prices,
                ) {
                    starts.push(start);
                }
            }
        }

        starts
    }
}

fn make_swap_start(
    tx_id: &str,
    memo_str: &str,
    coins: &[Coin],
    from_address: &str,
    height: u64,
    prices: &PoolPrices,
) -> Option<SwapStart> {
    let memo = Memo::parse(memo_str)?;
    if !memo.is_swap() {
        return None;
    }

    let Some(in_coin) = coins.first() else {
        debug!("[SwapStart] Swap memo without coins in tx {}", tx_id);
        return None;
    };

    let out_asset = if is_rune(&memo.asset) {
        NATIVE_RUNE.to_string()
    } else {
        match prices.resolve_pool(&memo.asset) {
            Some(pool) => pool,
            None => {
                warn!(
                    "[SwapStart] {}: output asset not found in the pool list",
                    memo.asset
                );
                memo.asset.clone()
            }
        }
    };

    let volume_usd = prices.volume_usd(in_coin.amount, &in_coin.asset);
    let is_streaming = memo.is_streaming();

    Some(SwapStart {
        tx_id: tx_id.to_uppercase(),
        from_address: from_address.to_string(),
        memo,
        memo_str: memo_str.to_string(),
        in_amount: in_coin.amount,
        in_asset: in_coin.asset.clone(),
        out_asset,
        is_streaming,
        block_height: height,
        volume_usd,
    })
}

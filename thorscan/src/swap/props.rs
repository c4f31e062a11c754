// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Swap state model
//!
//! A stored document accumulates scalar attributes (written at swap-start
//! registration) and per-event fragments (written by the correlation
//! engine). `SwapProps` is the restored view over one document: it parses
//! the fragments back into typed events and answers the completion
//! predicate. There is no failed state; transactions that never complete
//! simply age out of the store.

use crate::actions::{StreamingMeta, SubTx, SwapAction};
use crate::error::{ScanError, ScanResult};
use crate::events::{RawEvent, TypedEvent};
use crate::memo::Memo;
use crate::store::TxDocument;
use crate::types::Coin;
use std::collections::BTreeMap;
use tracing::warn;

/// Initial status, set on first sighting
pub const STATUS_OBSERVED_IN: &str = "observed_in";
/// Terminal status: a domain action has been emitted for this id
pub const STATUS_GIVEN_AWAY: &str = "given_away";

/// Prefix of event-fragment keys inside a document
pub const EVENT_KEY_PREFIX: &str = "ev_";

#[derive(Debug, Clone)]
pub struct SwapProps {
    pub attrs: TxDocument,
    /// Events restored from fragments, sorted by height
    pub events: Vec<TypedEvent>,
    pub memo: Option<Memo>,
}

impl SwapProps {
    /// Restore the view from a stored document
    pub fn restore(attrs: TxDocument) -> Self {
        let mut events: Vec<TypedEvent> = attrs
            .iter()
            .filter(|(key, _)| key.starts_with(EVENT_KEY_PREFIX))
            .filter_map(|(key, value)| {
                let raw: RawEvent = match serde_json::from_str(value) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("[SwapProps] Unreadable fragment {}: {}", key, e);
                        return None;
                    }
                };
                TypedEvent::parse(&raw)
            })
            .collect();
        events.sort_by_key(|ev| ev.height());

        let memo = Memo::parse(attrs.get("memo").map(String::as_str).unwrap_or(""));

        Self {
            attrs,
            events,
            memo,
        }
    }

    fn attr(&self, key: &str) -> &str {
        self.attrs.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn status(&self) -> &str {
        self.attr("status")
    }

    pub fn given_away(&self) -> bool {
        self.status() == STATUS_GIVEN_AWAY
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.attr("is_streaming"), "1" | "true" | "True")
    }

    pub fn from_address(&self) -> &str {
        self.attr("from_address")
    }

    pub fn tx_id(&self) -> String {
        let id = self.attr("id");
        if !id.is_empty() {
            return id.to_string();
        }
        self.events
            .iter()
            .map(|ev| ev.correlation_id())
            .find(|id| !id.is_empty())
            .unwrap_or("")
            .to_string()
    }

    pub fn in_coin(&self) -> Coin {
        Coin::new(
            self.attr("in_amount").parse().unwrap_or(0),
            self.attr("in_asset"),
        )
    }

    /// Height of the inbound block, from the registered attributes or the
    /// earliest recorded event
    pub fn block_height(&self) -> Option<u64> {
        let registered: u64 = self.attr("block_height").parse().unwrap_or(0);
        if registered > 0 {
            return Some(registered);
        }
        self.events.iter().map(|ev| ev.height()).min()
    }

    /// Swap-start attributes were registered for this document
    pub fn has_started(&self) -> bool {
        self.memo.as_ref().map(|m| m.is_swap()).unwrap_or(false)
            && !self.from_address().is_empty()
    }

    fn has_swap_events(&self) -> bool {
        self.events
            .iter()
            .any(|ev| matches!(ev, TypedEvent::Swap(_)))
    }

    /// Outbound-kind events that answer the user (OUT:/REFUND: memo)
    pub fn true_outbounds(&self) -> impl Iterator<Item = &TypedEvent> {
        self.events.iter().filter(|ev| {
            ev.is_outbound_kind() && {
                let memo = ev.outbound_memo().to_uppercase();
                memo.starts_with("OUT:") || memo.starts_with("REFUND:")
            }
        })
    }

    fn latest_streaming_event(&self) -> Option<&crate::events::StreamingSwapEvent> {
        self.events
            .iter()
            .rev()
            .find_map(|ev| match ev {
                TypedEvent::StreamingSwap(ss) => Some(ss),
                _ => None,
            })
    }

    /// The completion predicate: swap evidence plus at least one
    /// outbound/refund fragment; streaming swaps additionally require the
    /// latest progress fragment to report all sub-swaps executed.
    pub fn is_completed(&self) -> bool {
        if !self.has_started() && !self.has_swap_events() {
            return false;
        }

        if self.is_streaming() {
            match self.latest_streaming_event() {
                Some(ss) if ss.is_final() => {}
                _ => return false,
            }
        }

        self.true_outbounds().next().is_some()
    }

    /// Project the accumulated fragments into an immutable action.
    /// Pure: no store access. Must succeed whenever `is_completed`.
    pub fn build_action(&self, timestamp: f64) -> ScanResult<SwapAction> {
        let tx_id = self.tx_id();
        if tx_id.is_empty() {
            return Err(ScanError::Other(
                "cannot build action: no transaction id".to_string(),
            ));
        }

        let mut pools = Vec::new();
        let mut liquidity_fee_rune = 0u64;
        let mut slip_bps = 0u64;
        for ev in &self.events {
            if let TypedEvent::Swap(swap) = ev {
                if !swap.pool.is_empty() && !pools.contains(&swap.pool) {
                    pools.push(swap.pool.clone());
                }
                liquidity_fee_rune += swap.liquidity_fee_in_rune;
                slip_bps = slip_bps.max(swap.swap_slip);
            }
        }

        let affiliate_address = self
            .memo
            .as_ref()
            .filter(|m| m.affiliate_fee_bp > 0)
            .map(|m| m.affiliate_address.clone())
            .unwrap_or_default();

        let out_txs = self.gather_outbounds(&affiliate_address);

        let streaming = self.latest_streaming_event().map(|ss| StreamingMeta {
            interval: ss.interval,
            quantity: ss.quantity,
            count: ss.count,
            last_height: ss.last_height,
        });

        Ok(SwapAction {
            tx_id,
            timestamp,
            height: self.block_height().unwrap_or(0),
            memo: self.attr("memo").to_string(),
            from_address: self.from_address().to_string(),
            in_coin: self.in_coin(),
            pools,
            out_txs,
            liquidity_fee_rune,
            slip_bps,
            streaming,
            volume_usd: self.attr("volume_usd").parse().unwrap_or(0.0),
        })
    }

    /// Group outbound legs by destination, separating the affiliate payout
    fn gather_outbounds(&self, affiliate_address: &str) -> Vec<SubTx> {
        let mut grouped: BTreeMap<String, (Vec<Coin>, u64)> = BTreeMap::new();

        for ev in self.true_outbounds() {
            let (to_address, coin, height) = match ev {
                TypedEvent::Outbound(e) => (
                    e.to_address.clone(),
                    Coin::new(e.amount, e.asset.clone()),
                    e.height,
                ),
                TypedEvent::ScheduledOutbound(e) => (
                    e.to_address.clone(),
                    Coin::new(e.coin_amount, e.coin_asset.clone()),
                    e.height,
                ),
                _ => continue,
            };

            if !affiliate_address.is_empty() && to_address == affiliate_address {
                continue;
            }

            let entry = grouped.entry(to_address).or_insert_with(|| (Vec::new(), 0));
            entry.0.push(coin);
            entry.1 = entry.1.max(height);
        }

        grouped
            .into_iter()
            .map(|(address, (coins, height))| SubTx {
                address,
                coins,
                height,
            })
            .collect()
    }
}

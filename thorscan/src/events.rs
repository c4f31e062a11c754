// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed end-of-block events
//!
//! The node reports end-of-block events as a flat attribute bag. `RawEvent`
//! preserves that bag (it is also the unit persisted into the event store);
//! `TypedEvent` is the closed union of the kinds the correlation engine
//! consumes. Unknown kinds parse to `None` and are dropped by callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw event: type tag plus flat string attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub attrs: BTreeMap<String, String>,
    pub height: u64,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, height: u64) -> Self {
        Self {
            event_type: event_type.into(),
            attrs: BTreeMap::new(),
            height,
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> &str {
        self.attrs.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn get_u64(&self, key: &str) -> u64 {
        self.get(key).parse().unwrap_or(0)
    }

    /// Amount/asset pair, from explicit attributes or the combined
    /// `coin` field (`"<amount> <asset>"`).
    pub fn amount_asset(&self) -> (u64, String) {
        let explicit_amount = self.get_u64("amount");
        let explicit_asset = self.get("asset");
        if explicit_amount != 0 || !explicit_asset.is_empty() {
            return (explicit_amount, explicit_asset.to_string());
        }
        split_coin_field(self.get("coin"))
    }
}

/// Split `"<amount> <asset>"` into its parts; malformed input yields zeros
pub fn split_coin_field(field: &str) -> (u64, String) {
    let mut parts = field.split_whitespace();
    let amount = parts.next().and_then(|a| a.parse().ok()).unwrap_or(0);
    let asset = parts.next().unwrap_or("").to_string();
    (amount, asset)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapEvent {
    /// Correlation id: the inbound transaction id
    pub tx_id: String,
    pub pool: String,
    pub swap_slip: u64,
    pub liquidity_fee: u64,
    pub liquidity_fee_in_rune: u64,
    pub emit_asset: String,
    pub streaming_swap_quantity: u64,
    pub streaming_swap_count: u64,
    pub from_address: String,
    pub to_address: String,
    pub amount: u64,
    pub asset: String,
    pub memo: String,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingSwapEvent {
    pub tx_id: String,
    pub interval: u64,
    pub quantity: u64,
    pub count: u64,
    pub last_height: u64,
    pub deposit: String,
    pub in_amt: String,
    pub out_amt: String,
    pub height: u64,
}

impl StreamingSwapEvent {
    /// All requested sub-swaps have been executed
    pub fn is_final(&self) -> bool {
        self.quantity > 0 && self.count == self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Correlation id: the inbound transaction id this outbound answers
    pub in_tx_id: String,
    /// Outbound transaction id (zero hash for internal transfers)
    pub out_id: String,
    pub chain: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: u64,
    pub asset: String,
    pub memo: String,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOutboundEvent {
    /// Correlation id: the inbound transaction id
    pub in_hash: String,
    pub out_hash: String,
    pub chain: String,
    pub to_address: String,
    pub coin_asset: String,
    pub coin_amount: u64,
    pub memo: String,
    pub vault_pub_key: String,
    pub gas_rate: u64,
    pub height: u64,
}

/// Closed union of the event kinds the correlation engine consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedEvent {
    Swap(SwapEvent),
    StreamingSwap(StreamingSwapEvent),
    Outbound(OutboundEvent),
    ScheduledOutbound(ScheduledOutboundEvent),
}

impl TypedEvent {
    /// Parse a raw event; unknown kinds yield `None`
    pub fn parse(raw: &RawEvent) -> Option<TypedEvent> {
        match raw.event_type.as_str() {
            "swap" => {
                let (amount, asset) = raw.amount_asset();
                Some(TypedEvent::Swap(SwapEvent {
                    tx_id: raw.get("id").to_uppercase(),
                    pool: raw.get("pool").to_string(),
                    swap_slip: raw.get_u64("swap_slip"),
                    liquidity_fee: raw.get_u64("liquidity_fee"),
                    liquidity_fee_in_rune: raw.get_u64("liquidity_fee_in_rune"),
                    emit_asset: raw.get("emit_asset").to_string(),
                    streaming_swap_quantity: raw.get_u64("streaming_swap_quantity"),
                    streaming_swap_count: raw.get_u64("streaming_swap_count"),
                    from_address: raw.get("from").to_string(),
                    to_address: raw.get("to").to_string(),
                    amount,
                    asset,
                    memo: raw.get("memo").to_string(),
                    height: raw.height,
                }))
            }
            "streaming_swap" => Some(TypedEvent::StreamingSwap(StreamingSwapEvent {
                tx_id: raw.get("tx_id").to_uppercase(),
                interval: raw.get_u64("interval"),
                quantity: raw.get_u64("quantity"),
                count: raw.get_u64("count"),
                last_height: raw.get_u64("last_height"),
                deposit: raw.get("deposit").to_string(),
                in_amt: raw.get("in").to_string(),
                out_amt: raw.get("out").to_string(),
                height: raw.height,
            })),
            "outbound" => {
                let (amount, asset) = raw.amount_asset();
                Some(TypedEvent::Outbound(OutboundEvent {
                    in_tx_id: raw.get("in_tx_id").to_uppercase(),
                    out_id: raw.get("id").to_uppercase(),
                    chain: raw.get("chain").to_string(),
                    from_address: raw.get("from").to_string(),
                    to_address: raw.get("to").to_string(),
                    amount,
                    asset,
                    memo: raw.get("memo").to_string(),
                    height: raw.height,
                }))
            }
            "scheduled_outbound" => Some(TypedEvent::ScheduledOutbound(ScheduledOutboundEvent {
                in_hash: raw.get("in_hash").to_uppercase(),
                out_hash: raw.get("out_hash").to_uppercase(),
                chain: raw.get("chain").to_string(),
                to_address: raw.get("to_address").to_string(),
                coin_asset: raw.get("coin_asset").to_string(),
                coin_amount: raw.get_u64("coin_amount"),
                memo: raw.get("memo").to_string(),
                vault_pub_key: raw.get("vault_pub_key").to_string(),
                gas_rate: raw.get_u64("gas_rate"),
                height: raw.height,
            })),
            _ => None,
        }
    }

    /// The inbound transaction id this event ultimately belongs to.
    /// May be empty when the node omitted it; callers skip such events.
    pub fn correlation_id(&self) -> &str {
        match self {
            TypedEvent::Swap(e) => &e.tx_id,
            TypedEvent::StreamingSwap(e) => &e.tx_id,
            TypedEvent::Outbound(e) => &e.in_tx_id,
            TypedEvent::ScheduledOutbound(e) => &e.in_hash,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TypedEvent::Swap(_) => "swap",
            TypedEvent::StreamingSwap(_) => "streaming_swap",
            TypedEvent::Outbound(_) => "outbound",
            TypedEvent::ScheduledOutbound(_) => "scheduled_outbound",
        }
    }

    pub fn height(&self) -> u64 {
        match self {
            TypedEvent::Swap(e) => e.height,
            TypedEvent::StreamingSwap(e) => e.height,
            TypedEvent::Outbound(e) => e.height,
            TypedEvent::ScheduledOutbound(e) => e.height,
        }
    }

    /// Whether this is an outbound-kind event (real or scheduled)
    pub fn is_outbound_kind(&self) -> bool {
        matches!(
            self,
            TypedEvent::Outbound(_) | TypedEvent::ScheduledOutbound(_)
        )
    }

    /// Memo of outbound-kind events, empty otherwise
    pub fn outbound_memo(&self) -> &str {
        match self {
            TypedEvent::Outbound(e) => &e.memo,
            TypedEvent::ScheduledOutbound(e) => &e.memo,
            _ => "",
        }
    }
}

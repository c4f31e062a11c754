// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reduced THORChain memo grammar
//!
//! Only the memo kinds the scanner core consumes are parsed: swap intents,
//! outbound/refund links back to the inbound transaction, and the vault
//! housekeeping markers that must be ignored. Everything else is `Other`.
//!
//! Swap memo layout (fields are `:`-separated, comments after `|` ignored):
//!
//! ```text
//! SWAP:ASSET:DEST_ADDR:LIM[/INTERVAL/QUANTITY]:AFFILIATE:FEE_BP
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoAction {
    Swap,
    Outbound,
    Refund,
    Migrate,
    Consolidate,
    Other,
}

impl fmt::Display for MemoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoAction::Swap => "swap",
            MemoAction::Outbound => "out",
            MemoAction::Refund => "refund",
            MemoAction::Migrate => "migrate",
            MemoAction::Consolidate => "consolidate",
            MemoAction::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Parsed memo, populated only for the fields the action kind carries
#[derive(Debug, Clone, PartialEq)]
pub struct Memo {
    pub action: MemoAction,
    /// Output asset for swaps
    pub asset: String,
    /// Destination address for swaps
    pub dest_address: String,
    /// Output limit in base units (0 = none)
    pub limit: u64,
    /// Streaming sub-swap interval in blocks (0 = not streaming)
    pub stream_interval: u64,
    /// Streaming sub-swap quantity (0 = auto, 1 = single, >1 = streaming)
    pub stream_quantity: u64,
    pub affiliate_address: String,
    pub affiliate_fee_bp: u64,
    /// Inbound transaction id for OUT:/REFUND: memos
    pub tx_id: String,
}

impl Memo {
    fn empty(action: MemoAction) -> Self {
        Self {
            action,
            asset: String::new(),
            dest_address: String::new(),
            limit: 0,
            stream_interval: 0,
            stream_quantity: 0,
            affiliate_address: String::new(),
            affiliate_fee_bp: 0,
            tx_id: String::new(),
        }
    }

    /// Parse a memo string. Returns `None` only for an empty memo; an
    /// unrecognized action token parses as `MemoAction::Other`.
    pub fn parse(memo: &str) -> Option<Memo> {
        let gist = memo.split('|').next().unwrap_or("").trim();
        if gist.is_empty() {
            return None;
        }

        let components: Vec<&str> = gist.split(':').collect();
        let action_token = components[0].trim().to_lowercase();

        let action = match action_token.as_str() {
            "swap" | "s" | "=" => MemoAction::Swap,
            "out" => MemoAction::Outbound,
            "refund" => MemoAction::Refund,
            "migrate" => MemoAction::Migrate,
            "consolidate" => MemoAction::Consolidate,
            _ => MemoAction::Other,
        };

        let mut parsed = Memo::empty(action);

        match action {
            MemoAction::Swap => {
                parsed.asset = ith(&components, 1).to_string();
                // the destination field may carry a refund address after '/'
                parsed.dest_address = ith(&components, 2)
                    .split('/')
                    .next()
                    .unwrap_or("")
                    .to_string();
                let (limit, interval, quantity) = parse_streaming_params(ith(&components, 3));
                parsed.limit = limit;
                parsed.stream_interval = interval;
                parsed.stream_quantity = quantity;
                parsed.affiliate_address = ith(&components, 4).to_string();
                parsed.affiliate_fee_bp = parse_u64(ith(&components, 5));
            }
            MemoAction::Outbound | MemoAction::Refund => {
                parsed.tx_id = ith(&components, 1).to_uppercase();
            }
            _ => {}
        }

        Some(parsed)
    }

    /// Streaming swaps request more than one sub-swap
    pub fn is_streaming(&self) -> bool {
        self.stream_quantity > 1
    }

    pub fn is_swap(&self) -> bool {
        self.action == MemoAction::Swap
    }
}

/// Recover the inbound transaction id from an `OUT:`/`REFUND:` memo.
/// Returns `None` for every other memo shape.
pub fn inbound_id_of_outbound_memo(memo: &str) -> Option<String> {
    let parsed = Memo::parse(memo)?;
    match parsed.action {
        MemoAction::Outbound | MemoAction::Refund if !parsed.tx_id.is_empty() => {
            Some(parsed.tx_id)
        }
        _ => None,
    }
}

/// Vault housekeeping memos that never describe a user action
pub fn is_internal_memo(memo: &str) -> bool {
    matches!(
        Memo::parse(memo).map(|m| m.action),
        Some(MemoAction::Migrate) | Some(MemoAction::Consolidate)
    )
}

fn ith<'a>(components: &'a [&str], index: usize) -> &'a str {
    components.get(index).copied().unwrap_or("").trim()
}

fn parse_u64(s: &str) -> u64 {
    s.parse().unwrap_or(0)
}

/// `LIM/INTERVAL/QUANTITY` — missing parts default to zero
fn parse_streaming_params(field: &str) -> (u64, u64, u64) {
    let mut parts = field.split('/');
    let limit = parse_u64(parts.next().unwrap_or(""));
    let interval = parse_u64(parts.next().unwrap_or(""));
    let quantity = parse_u64(parts.next().unwrap_or(""));
    (limit, interval, quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_swap() {
        let m = Memo::parse("SWAP:BTC.BTC:bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh").unwrap();
        assert_eq!(m.action, MemoAction::Swap);
        assert_eq!(m.asset, "BTC.BTC");
        assert_eq!(m.dest_address, "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh");
        assert!(!m.is_streaming());
    }

    #[test]
    fn test_parse_streaming_swap() {
        let m = Memo::parse("=:ETH.ETH:0xabc:0/3/10:thor1aff:25").unwrap();
        assert_eq!(m.action, MemoAction::Swap);
        assert_eq!(m.limit, 0);
        assert_eq!(m.stream_interval, 3);
        assert_eq!(m.stream_quantity, 10);
        assert!(m.is_streaming());
        assert_eq!(m.affiliate_address, "thor1aff");
        assert_eq!(m.affiliate_fee_bp, 25);
    }

    #[test]
    fn test_parse_dest_with_refund_address() {
        let m = Memo::parse("s:THOR.RUNE:thor1dest/thor1refund:100").unwrap();
        assert_eq!(m.dest_address, "thor1dest");
        assert_eq!(m.limit, 100);
    }

    #[test]
    fn test_outbound_and_refund_recover_inbound_id() {
        assert_eq!(
            inbound_id_of_outbound_memo("OUT:ABCDEF0123"),
            Some("ABCDEF0123".to_string())
        );
        assert_eq!(
            inbound_id_of_outbound_memo("refund:abcdef"),
            Some("ABCDEF".to_string())
        );
        assert_eq!(inbound_id_of_outbound_memo("SWAP:BTC.BTC:addr"), None);
        assert_eq!(inbound_id_of_outbound_memo("OUT:"), None);
    }

    #[test]
    fn test_internal_memos() {
        assert!(is_internal_memo("MIGRATE:1234567"));
        assert!(is_internal_memo("consolidate"));
        assert!(!is_internal_memo("OUT:ABC"));
        assert!(!is_internal_memo(""));
    }

    #[test]
    fn test_comment_stripped() {
        let m = Memo::parse("OUT:FFAA|sent by vault").unwrap();
        assert_eq!(m.action, MemoAction::Outbound);
        assert_eq!(m.tx_id, "FFAA");
    }

    #[test]
    fn test_unknown_action_is_other() {
        let m = Memo::parse("BOND:thor1node").unwrap();
        assert_eq!(m.action, MemoAction::Other);
        assert!(Memo::parse("").is_none());
        assert!(Memo::parse("   ").is_none());
    }
}

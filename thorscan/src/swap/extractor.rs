// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Swap/event correlation engine
//!
//! Consumes one decoded block at a time, accumulates partial event
//! fragments per inbound transaction id in the event store, and emits a
//! finished `SwapAction` the first time a transaction becomes complete.
//! The engine owns the completion decision; the store owns persistence and
//! expiration only.

use crate::actions::SwapAction;
use crate::alert::{AlertSink, LogAlertSink};
use crate::block::result::BlockResult;
use crate::block::scanner::BlockSink;
use crate::diagnostics::{NoopDiagnostics, SwapDiagnostics};
use crate::error::{ScanError, ScanResult};
use crate::events::{RawEvent, TypedEvent};
use crate::height_time::HeightTime;
use crate::memo::{inbound_id_of_outbound_memo, is_internal_memo};
use crate::store::EventStore;
use crate::swap::props::{SwapProps, EVENT_KEY_PREFIX, STATUS_GIVEN_AWAY, STATUS_OBSERVED_IN};
use crate::swap::start_detector::{SwapStart, SwapStartDetector};
use crate::types::ZERO_HASH;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tiny_keccak::{Hasher, Keccak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct SwapExtractor {
    store: Arc<dyn EventStore>,
    detector: SwapStartDetector,
    height_time: Arc<dyn HeightTime>,
    diagnostics: Arc<dyn SwapDiagnostics>,
    alert: Arc<dyn AlertSink>,
    action_tx: Option<mpsc::Sender<SwapAction>>,
}

impl SwapExtractor {
    pub fn new(
        store: Arc<dyn EventStore>,
        detector: SwapStartDetector,
        height_time: Arc<dyn HeightTime>,
    ) -> Self {
        Self {
            store,
            detector,
            height_time,
            diagnostics: Arc::new(NoopDiagnostics),
            alert: Arc::new(LogAlertSink),
            action_tx: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn SwapDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_alert(mut self, alert: Arc<dyn AlertSink>) -> Self {
        self.alert = alert;
        self
    }

    /// Finished actions are also forwarded into this channel
    pub fn with_action_channel(mut self, tx: mpsc::Sender<SwapAction>) -> Self {
        self.action_tx = Some(tx);
        self
    }

    /// Process one block: register swap intents, persist event fragments,
    /// resolve completions. Returns the batch of finished actions, usually
    /// empty.
    pub async fn process(&self, block: &BlockResult) -> ScanResult<Vec<SwapAction>> {
        let new_swaps = self.register_new_swaps(block).await?;

        // swaps and outs from the end-of-block stream
        let mut events: Vec<(RawEvent, TypedEvent)> = block
            .end_block_events
            .iter()
            .filter_map(|raw| {
                TypedEvent::parse(raw).map(|typed| (raw.clone(), typed))
            })
            .collect();

        // plus outbounds recovered from observed-quorum transactions
        for raw in synthesize_observed_outbounds(block) {
            if let Some(typed) = TypedEvent::parse(&raw) {
                events.push((raw, typed));
            }
        }

        self.register_swap_events(&events).await?;

        let candidates: BTreeSet<String> = events
            .iter()
            .filter(|(_, typed)| typed.is_outbound_kind())
            .map(|(_, typed)| typed.correlation_id().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        let actions = self.resolve_completions(block, &candidates).await?;

        if !new_swaps.is_empty() || !actions.is_empty() {
            info!(
                "[Extractor] {} new swaps, {} finished in block #{}",
                new_swaps.len(),
                actions.len(),
                block.height
            );
        }

        Ok(actions)
    }

    /// Record incoming swap intents the first time they are seen
    async fn register_new_swaps(&self, block: &BlockResult) -> ScanResult<Vec<SwapStart>> {
        let swaps = self.detector.detect(block).await;

        for swap in &swaps {
            let existing = self.store.read(&swap.tx_id).await?;
            let has_status = existing
                .as_ref()
                .map(|doc| doc.contains_key("status"))
                .unwrap_or(false);
            if has_status {
                continue;
            }

            self.store
                .write_fields(
                    &swap.tx_id,
                    &[
                        ("id", swap.tx_id.clone()),
                        ("status", STATUS_OBSERVED_IN.to_string()),
                        ("memo", swap.memo_str.clone()),
                        ("from_address", swap.from_address.clone()),
                        ("in_amount", swap.in_amount.to_string()),
                        ("in_asset", swap.in_asset.clone()),
                        ("is_streaming", swap.is_streaming.to_string()),
                        ("out_asset", swap.out_asset.clone()),
                        ("block_height", swap.block_height.to_string()),
                        ("volume_usd", swap.volume_usd.to_string()),
                    ],
                )
                .await?;

            self.diagnostics.on_new_swap(swap);
        }

        Ok(swaps)
    }

    /// Persist every event under its correlation id, keyed by a stable
    /// per-event identity. Re-writing the same identity with the same
    /// content leaves the document unchanged.
    async fn register_swap_events(
        &self,
        events: &[(RawEvent, TypedEvent)],
    ) -> ScanResult<()> {
        for (raw, typed) in events {
            let tx_id = typed.correlation_id();
            if tx_id.is_empty() {
                debug!(
                    "[Extractor] {} event without correlation id at #{}, skipped",
                    typed.kind(),
                    typed.height()
                );
                continue;
            }

            let key = format!("{}{}_{}", EVENT_KEY_PREFIX, typed.kind(), event_identity(raw, typed));
            let fragment = serde_json::to_string(raw)
                .map_err(|e| ScanError::Other(format!("fragment serialization: {e}")))?;

            self.store.write(tx_id, &key, &fragment).await?;

            // a previously-unseen id gets its document stamped observed_in
            let doc = self.store.read(tx_id).await?;
            if doc.map(|d| !d.contains_key("status")).unwrap_or(true) {
                self.store
                    .write_fields(
                        tx_id,
                        &[
                            ("id", tx_id.to_string()),
                            ("status", STATUS_OBSERVED_IN.to_string()),
                        ],
                    )
                    .await?;
            }

            self.diagnostics.on_event(tx_id, typed.kind(), typed.height());
        }
        Ok(())
    }

    /// Flip completed transactions to given-away and build their actions.
    /// A failure on one candidate never aborts the remaining ones.
    async fn resolve_completions(
        &self,
        block: &BlockResult,
        candidates: &BTreeSet<String>,
    ) -> ScanResult<Vec<SwapAction>> {
        let mut actions = Vec::new();

        for tx_id in candidates {
            let Some(doc) = self.store.read(tx_id).await? else {
                warn!(
                    "[Extractor] Outbounds for tx {} but no info about its initiation",
                    tx_id
                );
                continue;
            };

            let props = SwapProps::restore(doc);
            if props.given_away() {
                continue;
            }
            if !props.is_completed() {
                continue;
            }

            let inbound_height = props.block_height().unwrap_or(block.height);
            let timestamp = self.height_time.timestamp_of(inbound_height);

            let action = match props.build_action(timestamp) {
                Ok(action) => action,
                Err(e) => {
                    error!(
                        "[Extractor] Completed tx {} but action build failed: {}",
                        tx_id, e
                    );
                    self.alert
                        .report("swap_extractor", &format!("action build failed for {tx_id}: {e}"));
                    continue;
                }
            };

            self.store
                .write_fields(tx_id, &[("status", STATUS_GIVEN_AWAY.to_string())])
                .await?;

            self.diagnostics.on_finished(&action);
            actions.push(action);
        }

        if !actions.is_empty() {
            info!("[Extractor] Giving away {} txs", actions.len());
        }

        Ok(actions)
    }

    /// Rebuild the action for one transaction id (administrative replay)
    pub async fn find_action(&self, tx_id: &str) -> ScanResult<Option<SwapAction>> {
        let Some(doc) = self.store.read(tx_id).await? else {
            return Ok(None);
        };
        let props = SwapProps::restore(doc);
        if !props.is_completed() {
            return Ok(None);
        }
        let height = props.block_height().unwrap_or(0);
        let timestamp = self.height_time.timestamp_of(height);
        props.build_action(timestamp).map(Some)
    }
}

#[async_trait]
impl BlockSink for SwapExtractor {
    async fn on_block(&self, block: &BlockResult) -> ScanResult<()> {
        let actions = self.process(block).await?;
        if let Some(tx) = &self.action_tx {
            for action in actions {
                if tx.send(action).await.is_err() {
                    warn!("[Extractor] Action subscriber dropped, discarding batch");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Turn every qualifying observed outbound transaction into one synthetic
/// outbound event per coin leg. Results accumulate across all observed
/// transactions in the block; one transaction's legs never clobber
/// another's.
fn synthesize_observed_outbounds(block: &BlockResult) -> Vec<RawEvent> {
    let mut synthesized = Vec::new();

    for tx in &block.txs {
        for (obs, direction) in tx.observed_txs() {
            if direction != crate::decode::ObservedDirection::Outbound {
                continue;
            }
            // vault housekeeping, not a user action
            if is_internal_memo(&obs.memo) {
                continue;
            }
            let Some(in_tx_id) = inbound_id_of_outbound_memo(&obs.memo) else {
                warn!(
                    "[Extractor] Observed outbound {} with unexpected memo {:?}, skipped",
                    obs.tx_id, obs.memo
                );
                continue;
            };

            for coin in &obs.coins {
                synthesized.push(
                    RawEvent::new("outbound", block.height)
                        .with_attr("in_tx_id", &in_tx_id)
                        .with_attr("id", &obs.tx_id)
                        .with_attr("chain", &obs.chain)
                        .with_attr("from", &obs.from_address)
                        .with_attr("to", &obs.to_address)
                        .with_attr("amount", coin.amount.to_string())
                        .with_attr("asset", &coin.asset)
                        .with_attr("memo", &obs.memo),
                );
            }
        }
    }

    synthesized
}

/// Stable per-event identity: the event's own outbound id when it carries a
/// non-trivial one, otherwise a content digest over kind, sorted attributes
/// and height. Deterministic across process restarts.
fn event_identity(raw: &RawEvent, typed: &TypedEvent) -> String {
    let explicit = match typed {
        TypedEvent::Outbound(e) => e.out_id.as_str(),
        TypedEvent::ScheduledOutbound(e) => e.out_hash.as_str(),
        _ => "",
    };
    if !explicit.is_empty() && explicit != ZERO_HASH {
        return explicit.chars().take(12).collect::<String>().to_lowercase();
    }
    content_digest(raw)
}

fn content_digest(raw: &RawEvent) -> String {
    let mut hasher = Keccak::v256();
    hasher.update(raw.event_type.as_bytes());
    for (key, value) in &raw.attrs {
        hasher.update(&[0u8]);
        hasher.update(key.as_bytes());
        hasher.update(&[1u8]);
        hasher.update(value.as_bytes());
    }
    hasher.update(&raw.height.to_be_bytes());

    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    hex::encode(&output[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{MsgDeposit, NativeTx, ObservedTx, TxMessage};
    use crate::height_time::AnchoredHeightTime;
    use crate::prices::PoolPrices;
    use crate::store::MemoryEventStore;
    use crate::types::Coin;
    use tokio::sync::RwLock;

    fn extractor(store: Arc<MemoryEventStore>) -> SwapExtractor {
        let prices = Arc::new(RwLock::new(
            PoolPrices::new(5.0).with_pool("BTC.BTC", 60_000.0),
        ));
        SwapExtractor::new(
            store,
            SwapStartDetector::new(prices),
            Arc::new(AnchoredHeightTime::new(0, 0.0, 6.0)),
        )
    }

    fn empty_block(height: u64) -> BlockResult {
        BlockResult {
            height,
            ..Default::default()
        }
    }

    fn swap_deposit_tx(tx_id: &str) -> NativeTx {
        NativeTx {
            hash: tx_id.to_string(),
            code: 0,
            memo: String::new(),
            messages: vec![TxMessage::Deposit(MsgDeposit {
                coins: vec![Coin::new(100_000_000, "THOR.RUNE")],
                memo: "=:BTC.BTC:bc1qdest".to_string(),
                signer: "thor1sender".to_string(),
            })],
            height: 0,
        }
    }

    fn swap_event(tx_id: &str, height: u64) -> RawEvent {
        RawEvent::new("swap", height)
            .with_attr("id", tx_id)
            .with_attr("pool", "BTC.BTC")
            .with_attr("liquidity_fee_in_rune", "1000")
            .with_attr("swap_slip", "10")
            .with_attr("memo", "=:BTC.BTC:bc1qdest")
    }

    fn outbound_event(in_tx_id: &str, out_id: &str, height: u64) -> RawEvent {
        RawEvent::new("outbound", height)
            .with_attr("in_tx_id", in_tx_id)
            .with_attr("id", out_id)
            .with_attr("chain", "BTC")
            .with_attr("to", "bc1qdest")
            .with_attr("amount", "160000")
            .with_attr("asset", "BTC.BTC")
            .with_attr("memo", format!("OUT:{in_tx_id}"))
    }

    fn observed_out_tx(out_id: &str, memo: &str, coins: Vec<Coin>) -> NativeTx {
        NativeTx {
            hash: format!("NATIVE{out_id}"),
            code: 0,
            memo: String::new(),
            messages: vec![TxMessage::ObservedTxOut(vec![ObservedTx {
                tx_id: out_id.to_string(),
                chain: "BTC".to_string(),
                from_address: "vault".to_string(),
                to_address: "bc1qdest".to_string(),
                coins,
                memo: memo.to_string(),
            }])],
            height: 0,
        }
    }

    // Scenario A: a swap event with no prior start record and no outbound
    // leaves a pending document and yields no action.
    #[tokio::test]
    async fn test_swap_event_alone_is_pending() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        let mut block = empty_block(100);
        block.end_block_events.push(swap_event("ABC", 100));

        let actions = ex.process(&block).await.unwrap();
        assert!(actions.is_empty());

        let doc = store.read("ABC").await.unwrap().unwrap();
        assert_eq!(doc.get("status").unwrap(), STATUS_OBSERVED_IN);
        assert!(doc.keys().any(|k| k.starts_with("ev_swap_")));

        let props = SwapProps::restore(doc);
        assert!(!props.is_completed());
    }

    // Scenario B: the outbound in the next block completes the swap and
    // emits exactly one action.
    #[tokio::test]
    async fn test_outbound_completes_swap() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        let mut block100 = empty_block(100);
        block100.end_block_events.push(swap_event("ABC", 100));
        assert!(ex.process(&block100).await.unwrap().is_empty());

        let mut block101 = empty_block(101);
        block101
            .end_block_events
            .push(outbound_event("ABC", "FEED", 101));

        let actions = ex.process(&block101).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].tx_id, "ABC");
        assert_eq!(actions[0].pools, vec!["BTC.BTC".to_string()]);

        let doc = store.read("ABC").await.unwrap().unwrap();
        assert_eq!(doc.get("status").unwrap(), STATUS_GIVEN_AWAY);
    }

    // At-most-once: redundant outbounds never re-emit an action.
    #[tokio::test]
    async fn test_at_most_once_emission() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        let mut block100 = empty_block(100);
        block100.end_block_events.push(swap_event("ABC", 100));
        block100
            .end_block_events
            .push(outbound_event("ABC", "FEED", 100));

        let first = ex.process(&block100).await.unwrap();
        assert_eq!(first.len(), 1);

        // same outbound observed again in a later block
        let mut block101 = empty_block(101);
        block101
            .end_block_events
            .push(outbound_event("ABC", "FEED", 101));
        let second = ex.process(&block101).await.unwrap();
        assert!(second.is_empty());

        // and re-processing the original block is also safe
        let third = ex.process(&block100).await.unwrap();
        assert!(third.is_empty());

        let doc = store.read("ABC").await.unwrap().unwrap();
        assert_eq!(doc.get("status").unwrap(), STATUS_GIVEN_AWAY);
    }

    // Scenario D: two observed outbound transactions for distinct inbound
    // ids both land in the candidate set and both complete.
    #[tokio::test]
    async fn test_two_observed_outbounds_in_one_block_produce_two_candidates() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        // both swaps start and trade first
        let mut block100 = empty_block(100);
        block100.txs.push(swap_deposit_tx("X"));
        block100.txs.push(swap_deposit_tx("Y"));
        block100.end_block_events.push(swap_event("X", 100));
        block100.end_block_events.push(swap_event("Y", 100));
        assert!(ex.process(&block100).await.unwrap().is_empty());

        // one block carries both observed outbounds
        let mut block101 = empty_block(101);
        block101.txs.push(observed_out_tx(
            "OUTX",
            "OUT:X",
            vec![Coin::new(160_000, "BTC.BTC")],
        ));
        block101.txs.push(observed_out_tx(
            "OUTY",
            "OUT:Y",
            vec![Coin::new(170_000, "BTC.BTC")],
        ));

        let actions = ex.process(&block101).await.unwrap();
        let mut ids: Vec<&str> = actions.iter().map(|a| a.tx_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["X", "Y"]);
    }

    #[tokio::test]
    async fn test_internal_and_malformed_observed_memos_skipped() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        let mut block = empty_block(50);
        block.txs.push(observed_out_tx(
            "M1",
            "MIGRATE:12345",
            vec![Coin::new(1, "BTC.BTC")],
        ));
        block.txs.push(observed_out_tx(
            "M2",
            "CONSOLIDATE",
            vec![Coin::new(1, "BTC.BTC")],
        ));
        block.txs.push(observed_out_tx(
            "M3",
            "hello world",
            vec![Coin::new(1, "BTC.BTC")],
        ));

        let actions = ex.process(&block).await.unwrap();
        assert!(actions.is_empty());
        assert!(store.is_empty().await);
    }

    // An outbound with no known inbound is abnormal but not fatal.
    #[tokio::test]
    async fn test_orphan_outbound_is_pending_not_fatal() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        let mut block = empty_block(60);
        block
            .end_block_events
            .push(outbound_event("GHOST", "FEED", 60));

        let actions = ex.process(&block).await.unwrap();
        assert!(actions.is_empty());

        // the fragment is kept for a possible late swap-start
        let doc = store.read("GHOST").await.unwrap().unwrap();
        assert!(doc.keys().any(|k| k.starts_with("ev_outbound_")));
        assert_eq!(doc.get("status").unwrap(), STATUS_OBSERVED_IN);
    }

    // Streaming swaps wait for the final progress fragment.
    #[tokio::test]
    async fn test_streaming_swap_waits_for_final_count() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        store
            .write_fields(
                "SS1",
                &[
                    ("id", "SS1".to_string()),
                    ("status", STATUS_OBSERVED_IN.to_string()),
                    ("memo", "=:BTC.BTC:bc1qdest:0/1/3".to_string()),
                    ("from_address", "thor1sender".to_string()),
                    ("in_amount", "300000000".to_string()),
                    ("in_asset", "THOR.RUNE".to_string()),
                    ("is_streaming", "true".to_string()),
                    ("block_height", "90".to_string()),
                ],
            )
            .await
            .unwrap();

        let mut block91 = empty_block(91);
        block91.end_block_events.push(
            RawEvent::new("streaming_swap", 91)
                .with_attr("tx_id", "SS1")
                .with_attr("quantity", "3")
                .with_attr("count", "2"),
        );
        block91
            .end_block_events
            .push(outbound_event("SS1", "FEED1", 91));
        assert!(ex.process(&block91).await.unwrap().is_empty());

        let mut block92 = empty_block(92);
        block92.end_block_events.push(
            RawEvent::new("streaming_swap", 92)
                .with_attr("tx_id", "SS1")
                .with_attr("quantity", "3")
                .with_attr("count", "3"),
        );
        block92
            .end_block_events
            .push(outbound_event("SS1", "FEED2", 92));

        let actions = ex.process(&block92).await.unwrap();
        assert_eq!(actions.len(), 1);
        let streaming = actions[0].streaming.as_ref().unwrap();
        assert_eq!(streaming.count, 3);
    }

    // Idempotent persistence: the same event re-written leaves the
    // document unchanged.
    #[tokio::test]
    async fn test_fragment_rewrite_is_idempotent() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        let mut block = empty_block(70);
        block.end_block_events.push(swap_event("IDEM", 70));

        ex.process(&block).await.unwrap();
        let first = store.read("IDEM").await.unwrap().unwrap();

        ex.process(&block).await.unwrap();
        let second = store.read("IDEM").await.unwrap().unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_multi_coin_observed_outbound_synthesizes_per_leg() {
        let block = {
            let mut b = empty_block(80);
            b.txs.push(observed_out_tx(
                "OUTM",
                "OUT:MULTI",
                vec![Coin::new(100, "BTC.BTC"), Coin::new(200, "BTC.BTC")],
            ));
            b
        };

        let synthesized = synthesize_observed_outbounds(&block);
        assert_eq!(synthesized.len(), 2);
        assert_eq!(synthesized[0].get("in_tx_id"), "MULTI");
        assert_eq!(synthesized[0].get("amount"), "100");
        assert_eq!(synthesized[1].get("amount"), "200");
    }

    #[test]
    fn test_event_identity_stability() {
        let raw = swap_event("ABC", 100);
        let typed = TypedEvent::parse(&raw).unwrap();

        // same content, same identity (restart-stable by construction)
        let a = event_identity(&raw, &typed);
        let b = event_identity(&raw.clone(), &typed.clone());
        assert_eq!(a, b);

        // different height changes the digest
        let mut other = raw.clone();
        other.height = 101;
        let typed_other = TypedEvent::parse(&other).unwrap();
        assert_ne!(a, event_identity(&other, &typed_other));
    }

    #[test]
    fn test_event_identity_prefers_explicit_outbound_id() {
        let raw = outbound_event("ABC", "FEEDBEEF12345678", 100);
        let typed = TypedEvent::parse(&raw).unwrap();
        assert_eq!(event_identity(&raw, &typed), "feedbeef1234");

        // zero hash falls back to the content digest
        let raw_zero = outbound_event("ABC", ZERO_HASH, 100);
        let typed_zero = TypedEvent::parse(&raw_zero).unwrap();
        let ident = event_identity(&raw_zero, &typed_zero);
        assert_eq!(ident.len(), 12);
        assert_ne!(ident, &ZERO_HASH[..12]);
    }

    #[tokio::test]
    async fn test_find_action_replay() {
        let store = Arc::new(MemoryEventStore::with_days(1));
        let ex = extractor(store.clone());

        let mut block = empty_block(100);
        block.txs.push(swap_deposit_tx("RPL"));
        block.end_block_events.push(swap_event("RPL", 100));
        block
            .end_block_events
            .push(outbound_event("RPL", "FEED", 100));
        ex.process(&block).await.unwrap();

        let action = ex.find_action("RPL").await.unwrap().unwrap();
        assert_eq!(action.tx_id, "RPL");
        assert!(ex.find_action("NOPE").await.unwrap().is_none());
    }
}

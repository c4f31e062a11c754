// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Native block scanner
//!
//! Pulls blocks strictly in height order, classifies fetch failures, and
//! hands each successfully decoded block to the sink exactly once. The
//! cursor only moves forward, except for explicit behind-jumps when the
//! node has retired the requested height.
//!
//! A tick normally processes one height. When the scanner detects that it
//! has fallen behind (no advance for longer than the aggressive threshold)
//! it keeps looping over consecutive heights within the same tick until it
//! reaches the chain tip.

use crate::alert::{AlertSink, LogAlertSink};
use crate::block::cursor::CursorFile;
use crate::block::result::BlockResult;
use crate::decode::decode_block_txs;
use crate::error::{ScanError, ScanResult};
use crate::rpc::NodeRpc;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SCANNER_NAME: &str = "block_scanner";

/// Consumer of successfully fetched blocks
#[async_trait]
pub trait BlockSink: Send + Sync {
    async fn on_block(&self, block: &BlockResult) -> ScanResult<()>;
}

#[derive(Debug, Clone)]
pub struct ScannerOptions {
    /// Explicit starting height; 0 means resume from the cursor file or
    /// the node's reported tip
    pub start_block: u64,
    /// Consecutive opaque failures tolerated before force-skipping a height
    pub max_attempts: u32,
    /// Allow jumping forward when the node has retired the requested height
    pub allow_jumps: bool,
    /// Process at most one block per tick (offline tooling only)
    pub one_block_per_run: bool,
    /// Expected chain block interval; also the tick period
    pub poll_interval: Duration,
    /// Aggressive mode engages when no advance happened for
    /// `poll_interval * aggressive_lag_factor`
    pub aggressive_lag_factor: f64,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            start_block: 0,
            max_attempts: 5,
            allow_jumps: true,
            one_block_per_run: false,
            poll_interval: Duration::from_secs(6),
            aggressive_lag_factor: 1.1,
        }
    }
}

pub struct BlockScanner {
    rpc: Arc<dyn NodeRpc>,
    sink: Arc<dyn BlockSink>,
    alert: Arc<dyn AlertSink>,
    cursor: Option<CursorFile>,
    options: ScannerOptions,

    /// Next height to fetch
    last_block: u64,
    /// Consecutive failures at the current height
    attempts: u32,
    /// When the cursor last advanced after a successful block
    last_advance: Option<Instant>,
}

impl BlockScanner {
    pub fn new(rpc: Arc<dyn NodeRpc>, sink: Arc<dyn BlockSink>, options: ScannerOptions) -> Self {
        Self {
            rpc,
            sink,
            alert: Arc::new(LogAlertSink),
            cursor: None,
            last_block: options.start_block,
            attempts: 0,
            last_advance: None,
            options,
        }
    }

    pub fn with_alert(mut self, alert: Arc<dyn AlertSink>) -> Self {
        self.alert = alert;
        self
    }

    pub fn with_cursor(mut self, cursor: CursorFile) -> Self {
        self.cursor = cursor.into();
        self
    }

    pub fn last_block(&self) -> u64 {
        self.last_block
    }

    /// Manual cursor override for recovery tooling
    pub fn set_last_block(&mut self, height: u64) {
        warn!(
            "[Scanner] Last block number manually changed from {} to {}",
            self.last_block, height
        );
        self.last_block = height;
        self.attempts = 0;
    }

    /// Establish a starting height. Blocks startup (not steady-state
    /// operation): retries the status endpoint forever until the node
    /// answers.
    pub async fn ensure_last_block(&mut self) {
        if self.last_block != 0 {
            return;
        }

        if let Some(saved) = self.cursor.as_ref().and_then(|c| c.load()) {
            info!("[Scanner] Resuming from saved cursor: #{}", saved);
            self.last_block = saved;
            return;
        }

        loop {
            match self.rpc.status().await {
                Ok(status) if status.latest_height > 0 => {
                    self.last_block = status.latest_height;
                    info!("[Scanner] Updated last block number: #{}", self.last_block);
                    return;
                }
                Ok(_) => error!("[Scanner] Node reported zero height, retrying"),
                Err(e) => error!("[Scanner] Still no last block height: {}", e),
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// Fetch block results and raw transactions for one height and merge
    /// them. RPC-level errors come back as a classified error marker, not
    /// an `Err`; transport and decode failures stay errors.
    pub async fn fetch_one(&self, height: u64) -> ScanResult<BlockResult> {
        let results_payload = match self.rpc.block_results(height).await {
            Ok(payload) => payload,
            Err(ScanError::Rpc {
                code,
                message,
                data,
            }) => return Ok(BlockResult::from_rpc_error(height, code, &message, &data)),
            Err(e) => return Err(e),
        };

        let mut block = BlockResult::load(&results_payload, height);

        let txs_payload = match self.rpc.block_txs(height).await {
            Ok(payload) => payload,
            Err(ScanError::Rpc {
                code,
                message,
                data,
            }) => return Ok(BlockResult::from_rpc_error(height, code, &message, &data)),
            Err(e) => return Err(e),
        };

        let txs = decode_block_txs(&txs_payload, height)?;
        block.fill_transactions(txs)?;

        debug!(
            "[Scanner] Block #{} has {} txs, {} end-of-block events",
            height,
            block.txs.len(),
            block.end_block_events.len()
        );

        Ok(block.only_successful())
    }

    fn should_run_aggressive(&self) -> bool {
        let Some(last_advance) = self.last_advance else {
            return false;
        };
        let tolerance =
            self.options.poll_interval.as_secs_f64() * self.options.aggressive_lag_factor;
        let since = last_advance.elapsed().as_secs_f64();
        if since > tolerance {
            info!(
                "[Scanner] {:.3}s since last block, running aggressive scan",
                since
            );
            return true;
        }
        false
    }

    /// One driver invocation: fetch the next height (or heights, in
    /// aggressive mode), classify failures, advance or jump the cursor.
    pub async fn tick(&mut self) -> ScanResult<()> {
        self.ensure_last_block().await;

        let aggressive = self.should_run_aggressive();
        let mut cycle = 0u32;

        loop {
            debug!(
                "[Scanner] Fetching block #{} (cycle {})",
                self.last_block, cycle
            );

            let block = match self.fetch_one(self.last_block).await {
                Ok(block) => block,
                Err(e) => {
                    self.on_error(&e.to_string());
                    break;
                }
            };

            if block.is_error {
                if self.options.allow_jumps && block.is_behind() {
                    warn!(
                        "[Scanner] No blocks available before #{}, jumping to it",
                        block.last_available_block
                    );
                    self.alert.report(
                        SCANNER_NAME,
                        &format!(
                            "Jump block from #{} to #{}",
                            self.last_block, block.last_available_block
                        ),
                    );
                    self.last_block = block.last_available_block;
                    self.attempts = 0;
                    self.save_cursor();
                    continue;
                } else if block.is_ahead() {
                    debug!(
                        "[Scanner] Running ahead of chain tip (requested #{}, node at #{})",
                        self.last_block, block.last_available_block
                    );
                    break;
                } else {
                    self.on_error(&format!(
                        "code={} {}",
                        block.error_code, block.error_message
                    ));
                    break;
                }
            }

            // hand to the correlation engine; the block is an atomic unit
            // of work per height
            if let Err(e) = self.sink.on_block(&block).await {
                // the cursor stays put and the attempt counter is not
                // touched: the store being down must never force-skip a
                // block whose events were not persisted
                if matches!(e, ScanError::Store(_)) {
                    self.alert.report(
                        SCANNER_NAME,
                        &format!("Store failure at block #{}: {}", self.last_block, e),
                    );
                } else {
                    error!(
                        "[Scanner] Failed to process block #{}: {}",
                        self.last_block, e
                    );
                }
                break;
            }

            self.last_advance = Some(Instant::now());
            self.last_block += 1;
            self.attempts = 0;
            cycle += 1;
            self.save_cursor();

            if self.options.one_block_per_run {
                warn!("[Scanner] One block per run mode is on, stopping");
                break;
            }
            if !aggressive {
                break;
            }
        }

        Ok(())
    }

    /// Run ticks on the polling interval until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "[Scanner] Started (interval {:?}, max_attempts {})",
            self.options.poll_interval, self.options.max_attempts
        );

        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Scanner] Cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("[Scanner] Tick failed: {}", e);
                    }
                }
            }
        }
    }

    fn on_error(&mut self, reason: &str) {
        warn!(
            "[Scanner] Error fetching block #{} ({})",
            self.last_block, reason
        );
        self.attempts += 1;

        if self.attempts >= self.options.max_attempts {
            error!(
                "[Scanner] Too many attempts to get block #{}, skipping it",
                self.last_block
            );
            self.alert.report(
                SCANNER_NAME,
                &format!(
                    "Block scan fail at #{}, skipped after {} attempts: {}",
                    self.last_block, self.attempts, reason
                ),
            );
            self.last_block += 1;
            self.attempts = 0;
            self.save_cursor();
        }
    }

    fn save_cursor(&self) {
        if let Some(cursor) = &self.cursor {
            cursor.save(self.last_block);
        }
    }
}

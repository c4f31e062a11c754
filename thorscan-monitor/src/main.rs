// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Thorscan monitor
//!
//! Wires the block scanner to the swap correlation engine and runs them on
//! a timer until shutdown. Finished swap actions are consumed from the
//! extractor's channel and logged; downstream delivery (messaging,
//! rendering) hooks in there.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thorscan::alert::LogAlertSink;
use thorscan::block::cursor::CursorFile;
use thorscan::block::scanner::{BlockScanner, ScannerOptions};
use thorscan::config::Config;
use thorscan::height_time::AnchoredHeightTime;
use thorscan::prices::PoolPrices;
use thorscan::rpc::{NodeRpc, NodeRpcClient};
use thorscan::store::MemoryEventStore;
use thorscan::swap::extractor::SwapExtractor;
use thorscan::swap::start_detector::SwapStartDetector;
use thorscan::SwapAction;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case", author, version)]
struct Args {
    /// Path to the YAML configuration file
    #[clap(env = "THORSCAN_CONFIG", long, default_value = "thorscan.yaml")]
    config: PathBuf,

    /// Override the starting height (0 = resume from cursor or chain tip)
    #[clap(env, long)]
    start_block: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_file(&args.config)
        .context(format!("Failed to load config from {:?}", args.config))?;

    info!("Thorscan monitor starting");
    info!("  RPC URL: {}", config.node.rpc_url);
    info!("  API URL: {}", config.node.api_url);
    info!("  Poll interval: {:?}", config.node.poll_interval());
    info!("  Store TTL: {} days", config.store.ttl_days);

    let rpc = Arc::new(NodeRpcClient::new(
        config.node.rpc_url.clone(),
        config.node.api_url.clone(),
    ));

    // anchor height->time at the node's current tip
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64();
    let anchor_height = match rpc.status().await {
        Ok(status) => {
            info!("Connected, node tip at #{}", status.latest_height);
            status.latest_height
        }
        Err(e) => {
            error!("Node status unavailable at startup: {}", e);
            0
        }
    };
    let height_time = Arc::new(AnchoredHeightTime::new(
        anchor_height,
        now,
        config.node.poll_interval_secs,
    ));

    let mut prices = PoolPrices::new(config.prices.usd_per_rune);
    for (pool, usd) in &config.prices.pools {
        prices = prices.with_pool(pool, *usd);
    }
    let prices = Arc::new(RwLock::new(prices));

    let store = Arc::new(MemoryEventStore::with_days(config.store.ttl_days));

    let (action_tx, mut action_rx) = mpsc::channel::<SwapAction>(64);
    let extractor = Arc::new(
        SwapExtractor::new(
            store.clone(),
            SwapStartDetector::new(prices),
            height_time,
        )
        .with_action_channel(action_tx),
    );

    let options = ScannerOptions {
        start_block: args
            .start_block
            .or(config.scanner.start_block)
            .unwrap_or(0),
        max_attempts: config.scanner.max_attempts,
        allow_jumps: config.scanner.allow_jumps,
        one_block_per_run: config.scanner.one_block_per_run,
        poll_interval: config.node.poll_interval(),
        aggressive_lag_factor: config.scanner.aggressive_lag_factor,
    };

    let scanner = BlockScanner::new(rpc, extractor, options)
        .with_alert(Arc::new(LogAlertSink))
        .with_cursor(CursorFile::new(config.cursor_file.clone()));

    let cancel = CancellationToken::new();

    // consume finished actions; delivery subsystems subscribe here
    let consumer_cancel = cancel.clone();
    let consumer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = consumer_cancel.cancelled() => break,
                action = action_rx.recv() => {
                    let Some(action) = action else { break };
                    info!(
                        "Swap finished: tx={} in={} out_legs={} volume=${:.2} streaming={}",
                        action.tx_id,
                        action.in_coin,
                        action.out_txs.len(),
                        action.volume_usd,
                        action.is_streaming(),
                    );
                }
            }
        }
    });

    // periodic reclaim of expired store documents
    let purge_store = store.clone();
    let purge_cancel = cancel.clone();
    let purger = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = purge_cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = purge_store.purge_expired().await;
                    if removed > 0 {
                        info!("Reclaimed {} expired swap documents", removed);
                    }
                }
            }
        }
    });

    let scanner_handle = tokio::spawn(scanner.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    cancel.cancel();

    let _ = scanner_handle.await;
    let _ = consumer.await;
    let _ = purger.await;

    info!("Thorscan monitor stopped");
    Ok(())
}

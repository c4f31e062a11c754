// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Injectable diagnostics for investigating individual swaps
//!
//! The correlation engine reports its lifecycle observations here. The
//! default implementation does nothing; a debugging host can inject a
//! collector scoped to one transaction id.

use crate::actions::SwapAction;
use crate::swap::start_detector::SwapStart;

pub trait SwapDiagnostics: Send + Sync {
    fn on_new_swap(&self, _start: &SwapStart) {}
    fn on_event(&self, _tx_id: &str, _kind: &str, _height: u64) {}
    fn on_finished(&self, _action: &SwapAction) {}
}

#[derive(Debug, Default)]
pub struct NoopDiagnostics;

impl SwapDiagnostics for NoopDiagnostics {}

/// Diagnostics focused on a single watched transaction id, logging each
/// observation at info level
pub struct WatchedSwapDiagnostics {
    pub watch_tx_id: String,
}

impl SwapDiagnostics for WatchedSwapDiagnostics {
    fn on_new_swap(&self, start: &SwapStart) {
        if start.tx_id == self.watch_tx_id {
            tracing::info!("[Diag] Start watching swap {}: {:?}", start.tx_id, start);
        }
    }

    fn on_event(&self, tx_id: &str, kind: &str, height: u64) {
        if tx_id == self.watch_tx_id {
            tracing::info!(
                "[Diag] New {} event for watched tx {} at block #{}",
                kind,
                tx_id,
                height
            );
        }
    }

    fn on_finished(&self, action: &SwapAction) {
        if action.tx_id == self.watch_tx_id {
            tracing::info!("[Diag] Watched swap {} finished", action.tx_id);
        }
    }
}

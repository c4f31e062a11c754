// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Height to wall-clock mapping
//!
//! Finished actions carry an approximate timestamp resolved from the block
//! height at which the swap started. The shipped implementation
//! extrapolates linearly from the most recent (height, timestamp) anchor.

use std::sync::RwLock;

pub trait HeightTime: Send + Sync {
    /// Approximate unix timestamp (seconds) for a block height
    fn timestamp_of(&self, height: u64) -> f64;
}

pub struct AnchoredHeightTime {
    block_time_secs: f64,
    anchor: RwLock<(u64, f64)>,
}

impl AnchoredHeightTime {
    pub fn new(anchor_height: u64, anchor_ts: f64, block_time_secs: f64) -> Self {
        Self {
            block_time_secs,
            anchor: RwLock::new((anchor_height, anchor_ts)),
        }
    }

    /// Move the anchor to a freshly observed (height, timestamp) pair
    pub fn update_anchor(&self, height: u64, ts: f64) {
        let mut anchor = self.anchor.write().expect("anchor lock poisoned");
        *anchor = (height, ts);
    }
}

impl HeightTime for AnchoredHeightTime {
    fn timestamp_of(&self, height: u64) -> f64 {
        let (anchor_height, anchor_ts) = *self.anchor.read().expect("anchor lock poisoned");
        let delta_blocks = height as f64 - anchor_height as f64;
        anchor_ts + delta_blocks * self.block_time_secs
    }
}

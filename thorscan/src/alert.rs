// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Operational alert hook
//!
//! The scanner reports abnormal-but-survivable conditions (force-skipped
//! blocks, behind-jumps, store outages) through this one-line hook. Wiring
//! it to a real notification channel is the host's concern.

use tracing::error;

pub trait AlertSink: Send + Sync {
    fn report(&self, source: &str, message: &str);
}

/// Default sink: one error-level log line per alert
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn report(&self, source: &str, message: &str) {
        error!("[Alert] {}: {}", source, message);
    }
}

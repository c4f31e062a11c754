// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the scanner core

/// Error type for scan operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    /// Network-level failure talking to the node (connect, timeout, 5xx)
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with an RPC-level error object
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        /// Free-form detail payload; may embed the last available height
        data: String,
    },

    /// Payload was received but could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// The event attribute store is unreachable or rejected an operation
    #[error("store error: {0}")]
    Store(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl ScanError {
    /// Whether the next tick is expected to succeed without intervention
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::Transport(_)
                | ScanError::Rpc { .. }
                | ScanError::Decode(_)
                | ScanError::Store(_)
        )
    }

    /// Short string identifying the error kind for log/alert labels
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Transport(_) => "transport",
            ScanError::Rpc { .. } => "rpc",
            ScanError::Decode(_) => "decode",
            ScanError::Store(_) => "store",
            ScanError::InvalidResponse(_) => "invalid_response",
            ScanError::Other(_) => "other",
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ScanError::Transport("timeout".into()).is_recoverable());
        assert!(ScanError::Store("down".into()).is_recoverable());
        assert!(ScanError::Rpc {
            code: -32603,
            message: "Internal error".into(),
            data: String::new(),
        }
        .is_recoverable());
        assert!(!ScanError::Other("bug".into()).is_recoverable());
    }

    #[test]
    fn test_kind_labels_are_stable() {
        // These strings appear in operational alerts; keep them stable.
        assert_eq!(ScanError::Transport(String::new()).kind(), "transport");
        assert_eq!(ScanError::Store(String::new()).kind(), "store");
        assert_eq!(ScanError::Decode(String::new()).kind(), "decode");
    }
}

// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scanner cursor persistence
//!
//! Stores the next height to fetch in a small JSON file so restarts resume
//! where the previous run stopped instead of rescanning from genesis.
//! Load/save failures are logged and tolerated; the scanner falls back to
//! the node's reported tip.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CursorState {
    last_block: u64,
}

#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Last persisted cursor, if the file exists and parses
    pub fn load(&self) -> Option<u64> {
        if !self.path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("[Cursor] Failed to read {:?}: {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str::<CursorState>(&contents) {
            Ok(state) if state.last_block > 0 => Some(state.last_block),
            Ok(_) => None,
            Err(e) => {
                warn!("[Cursor] Failed to parse {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn save(&self, last_block: u64) {
        let state = CursorState { last_block };
        let contents = match serde_json::to_string_pretty(&state) {
            Ok(c) => c,
            Err(e) => {
                warn!("[Cursor] Failed to serialize cursor: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, contents) {
            warn!("[Cursor] Failed to write {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("thorscan-cursor-test-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = temp_path("roundtrip");
        let cursor = CursorFile::new(path.clone());

        assert_eq!(cursor.load(), None);
        cursor.save(1234);
        assert_eq!(cursor.load(), Some(1234));
        cursor.save(5678);
        assert_eq!(cursor.load(), Some(5678));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_corrupt_file_yields_none() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json at all").unwrap();

        let cursor = CursorFile::new(path.clone());
        assert_eq!(cursor.load(), None);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_zero_cursor_ignored() {
        let path = temp_path("zero");
        std::fs::write(&path, r#"{"last_block": 0}"#).unwrap();

        let cursor = CursorFile::new(path.clone());
        assert_eq!(cursor.load(), None);

        let _ = std::fs::remove_file(path);
    }
}

// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Event attribute store
//!
//! One flat document per inbound transaction id: scalar fields (status,
//! swap-start attributes) and named event fragments share the same string
//! map. Writes refresh the document's expiration, so actively-updated
//! in-flight transactions never expire mid-flight, while abandoned ones are
//! reclaimed after the horizon elapses. The store has no domain knowledge
//! of completion; that belongs to the correlation engine.

use crate::error::ScanResult;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// The merged document for one transaction id
pub type TxDocument = BTreeMap<String, String>;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Merge one named fragment into the document for `tx_id`
    async fn write(&self, tx_id: &str, key: &str, fragment: &str) -> ScanResult<()>;

    /// Merge top-level scalar fields (status transitions, swap-start attrs)
    async fn write_fields(&self, tx_id: &str, fields: &[(&str, String)]) -> ScanResult<()>;

    /// The fully merged document, or `None` if missing or expired
    async fn read(&self, tx_id: &str) -> ScanResult<Option<TxDocument>>;

    /// Administrative removal
    async fn erase(&self, tx_id: &str) -> ScanResult<()>;
}

struct StoredDoc {
    attrs: TxDocument,
    /// Rolling deadline, refreshed on every write
    deadline: Instant,
}

/// In-memory store with a rolling time-to-live per document
pub struct MemoryEventStore {
    ttl: Duration,
    docs: RwLock<HashMap<String, StoredDoc>>,
}

pub const DEFAULT_TTL_DAYS: u64 = 3;

impl MemoryEventStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            docs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_days(days: u64) -> Self {
        Self::new(Duration::from_secs(days * 24 * 3600))
    }

    /// Drop all expired documents; returns how many were reclaimed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|_, doc| doc.deadline > now);
        let removed = before - docs.len();
        if removed > 0 {
            debug!("[EventStore] Reclaimed {} expired documents", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::with_days(DEFAULT_TTL_DAYS)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn write(&self, tx_id: &str, key: &str, fragment: &str) -> ScanResult<()> {
        let mut docs = self.docs.write().await;
        let deadline = Instant::now() + self.ttl;
        let doc = docs.entry(tx_id.to_string()).or_insert_with(|| StoredDoc {
            attrs: TxDocument::new(),
            deadline,
        });
        doc.attrs.insert(key.to_string(), fragment.to_string());
        doc.deadline = deadline;
        Ok(())
    }

    async fn write_fields(&self, tx_id: &str, fields: &[(&str, String)]) -> ScanResult<()> {
        let mut docs = self.docs.write().await;
        let deadline = Instant::now() + self.ttl;
        let doc = docs.entry(tx_id.to_string()).or_insert_with(|| StoredDoc {
            attrs: TxDocument::new(),
            deadline,
        });
        for (key, value) in fields {
            doc.attrs.insert((*key).to_string(), value.clone());
        }
        doc.deadline = deadline;
        Ok(())
    }

    async fn read(&self, tx_id: &str) -> ScanResult<Option<TxDocument>> {
        {
            let docs = self.docs.read().await;
            match docs.get(tx_id) {
                Some(doc) if doc.deadline > Instant::now() => {
                    return Ok(Some(doc.attrs.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: reclaim lazily
        let mut docs = self.docs.write().await;
        if let Some(doc) = docs.get(tx_id) {
            if doc.deadline <= Instant::now() {
                docs.remove(tx_id);
            }
        }
        Ok(None)
    }

    async fn erase(&self, tx_id: &str) -> ScanResult<()> {
        let mut docs = self.docs.write().await;
        docs.remove(tx_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read_merge() {
        let store = MemoryEventStore::with_days(1);

        store.write("abc", "ev_swap_1", "{\"x\":1}").await.unwrap();
        store
            .write_fields("abc", &[("status", "observed_in".to_string())])
            .await
            .unwrap();

        let doc = store.read("abc").await.unwrap().unwrap();
        assert_eq!(doc.get("ev_swap_1").unwrap(), "{\"x\":1}");
        assert_eq!(doc.get("status").unwrap(), "observed_in");
    }

    #[tokio::test]
    async fn test_idempotent_write() {
        let store = MemoryEventStore::with_days(1);

        store.write("abc", "ev_swap_1", "payload").await.unwrap();
        let first = store.read("abc").await.unwrap().unwrap();

        // same identity, same content: document is byte-for-byte unchanged
        store.write("abc", "ev_swap_1", "payload").await.unwrap();
        let second = store.read("abc").await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_and_erased_are_absent() {
        let store = MemoryEventStore::with_days(1);
        assert!(store.read("nope").await.unwrap().is_none());

        store.write("abc", "k", "v").await.unwrap();
        store.erase("abc").await.unwrap();
        assert!(store.read("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiration_without_erase() {
        let store = MemoryEventStore::new(Duration::from_millis(40));
        store.write("abc", "k", "v").await.unwrap();
        assert!(store.read("abc").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.read("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rolling_window_refreshes_on_write() {
        let store = MemoryEventStore::new(Duration::from_millis(80));
        store.write("abc", "k1", "v1").await.unwrap();

        // keep touching the document; it must survive well past one TTL
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            store.write("abc", "k2", "v2").await.unwrap();
        }
        assert!(store.read("abc").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.read("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryEventStore::new(Duration::from_millis(30));
        store.write("a", "k", "v").await.unwrap();
        store.write("b", "k", "v").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.write("c", "k", "v").await.unwrap();

        let removed = store.purge_expired().await;
        assert_eq!(removed, 2);
        assert_eq!(store.len().await, 1);
    }
}

//! Feed store trait and the in-memory backend.
//!
//! Stores persist [`FeedRecord`]s keyed by transaction id. Implementations
//! include `MemoryFeedStore` (here), `SqliteFeedStore` and
//! `PostgresFeedStore` (in `chainfeed-storage`).

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::types::FeedRecord;

/// Durable keyed collection of feed records.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Insert a record keyed by `record.id`.
    ///
    /// Idempotent: writing an id that already exists leaves the stored
    /// record as it is and is not an error.
    async fn put(&self, record: FeedRecord) -> Result<(), FeedError>;

    /// Return up to `limit` records, newest first (by block timestamp, then
    /// insertion order).
    async fn get_range(&self, limit: usize) -> Result<Vec<FeedRecord>, FeedError>;

    /// Short backend name for logs (e.g. `"memory"`).
    fn backend(&self) -> &'static str;
}

// ─── In-memory store ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    records: Vec<FeedRecord>,
    ids: HashSet<String>,
}

/// In-memory feed store for tests and ephemeral deployments.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryFeedStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    /// Returns `true` if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn put(&self, record: FeedRecord) -> Result<(), FeedError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.ids.insert(record.id.clone()) {
            inner.records.push(record);
        }
        Ok(())
    }

    async fn get_range(&self, limit: usize) -> Result<Vec<FeedRecord>, FeedError> {
        let inner = self.inner.lock().unwrap();
        // Newest insertion first, then a stable sort keeps that order among
        // equal timestamps.
        let mut records: Vec<&FeedRecord> = inner.records.iter().rev().collect();
        records.sort_by_key(|r| Reverse(r.timestamp));
        Ok(records.into_iter().take(limit).cloned().collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, timestamp: i64) -> FeedRecord {
        FeedRecord {
            id: id.into(),
            subnet_id: "subnet".into(),
            chain_id: "chain".into(),
            address: "nuklai1sender".into(),
            timestamp,
            fee: 1_000,
            content: r#"{"message":"m","url":""}"#.into(),
        }
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = MemoryFeedStore::new();
        store.put(record("tx1", 10)).await.unwrap();
        store.put(record("tx1", 10)).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn range_is_newest_first_and_bounded() {
        let store = MemoryFeedStore::new();
        store.put(record("a", 10)).await.unwrap();
        store.put(record("b", 20)).await.unwrap();
        store.put(record("c", 20)).await.unwrap();
        store.put(record("d", 30)).await.unwrap();

        let ids: Vec<_> = store
            .get_range(3)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["d", "c", "b"]);
    }

    #[tokio::test]
    async fn empty_store_returns_empty_range() {
        let store = MemoryFeedStore::new();
        assert!(store.get_range(10).await.unwrap().is_empty());
        assert!(store.is_empty());
    }
}

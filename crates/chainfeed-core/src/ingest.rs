//! Ingestion pipeline — writes accepted entries through the feed store.
//!
//! A failed write is logged and dropped. The listener never waits on a
//! retry and never stops because the store is unhappy.

use std::sync::Arc;

use tracing::{error, info};

use crate::store::FeedStore;
use crate::types::FeedEntry;

/// Writes feed entries to a [`FeedStore`].
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn FeedStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    /// The store this pipeline writes to.
    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    /// Serialize and persist `entry`. Returns `true` if the write succeeded.
    pub async fn append(&self, entry: &FeedEntry) -> bool {
        info!(tx_id = %entry.id, address = %entry.address, fee = entry.fee, "appending new feed entry");

        let record = match entry.to_record() {
            Ok(record) => record,
            Err(e) => {
                error!(tx_id = %entry.id, error = %e, "failed to serialize feed content");
                return false;
            }
        };

        match self.store.put(record).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    tx_id = %entry.id,
                    backend = self.store.backend(),
                    error = %e,
                    "failed to save feed entry"
                );
                false
            }
        }
    }
}

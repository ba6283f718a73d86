//! SQLite feed store.
//!
//! One `feeds` table in a single file, WAL mode. `seq` records insertion
//! order so entries sharing a block timestamp still come back newest first.
//!
//! # Usage
//! ```rust,no_run
//! use chainfeed_storage::sqlite::SqliteFeedStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteFeedStore::open("./chainfeed.db").await?;
//! let scratch = SqliteFeedStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainfeed_core::error::FeedError;
use chainfeed_core::store::FeedStore;
use chainfeed_core::types::FeedRecord;

fn storage_err(e: sqlx::Error) -> FeedError {
    FeedError::Storage(e.to_string())
}

/// SQLite-backed [`FeedStore`].
pub struct SqliteFeedStore {
    pool: SqlitePool,
}

impl SqliteFeedStore {
    /// Open (or create) a database at `path`.
    ///
    /// Accepts a plain path (`"./chainfeed.db"`) or a full SQLite URL.
    pub async fn open(path: &str) -> Result<Self, FeedError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema(true).await?;
        Ok(store)
    }

    /// Open a private in-memory database. Data is lost when dropped.
    pub async fn in_memory() -> Result<Self, FeedError> {
        // Every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema(false).await?;
        Ok(store)
    }

    async fn init_schema(&self, wal: bool) -> Result<(), FeedError> {
        if wal {
            sqlx::query("PRAGMA journal_mode=WAL;")
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS feeds (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_id      TEXT    NOT NULL UNIQUE,
                subnet_id  TEXT    NOT NULL,
                chain_id   TEXT    NOT NULL,
                address    TEXT    NOT NULL,
                timestamp  INTEGER NOT NULL,
                fee        INTEGER NOT NULL,
                content    TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feeds_timestamp ON feeds (timestamp, seq);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    /// Total number of stored entries.
    pub async fn count(&self) -> Result<u64, FeedError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM feeds")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn put(&self, record: FeedRecord) -> Result<(), FeedError> {
        let fee = i64::try_from(record.fee)
            .map_err(|_| FeedError::Storage(format!("fee {} does not fit in INTEGER", record.fee)))?;

        let result = sqlx::query(
            "INSERT INTO feeds (tx_id, subnet_id, chain_id, address, timestamp, fee, content)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tx_id) DO NOTHING",
        )
        .bind(&record.id)
        .bind(&record.subnet_id)
        .bind(&record.chain_id)
        .bind(&record.address)
        .bind(record.timestamp)
        .bind(fee)
        .bind(&record.content)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(tx_id = %record.id, inserted = result.rows_affected() == 1, "feed entry stored");
        Ok(())
    }

    async fn get_range(&self, limit: usize) -> Result<Vec<FeedRecord>, FeedError> {
        if limit == 0 {
            return Ok(vec![]);
        }
        let rows = sqlx::query(
            "SELECT tx_id, subnet_id, chain_id, address, timestamp, fee, content
             FROM feeds ORDER BY timestamp DESC, seq DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|r| FeedRecord {
                id: r.get("tx_id"),
                subnet_id: r.get("subnet_id"),
                chain_id: r.get("chain_id"),
                address: r.get("address"),
                timestamp: r.get("timestamp"),
                fee: r.get::<i64, _>("fee") as u64,
                content: r.get("content"),
            })
            .collect())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

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
            fee: 1_000_000,
            content: r#"{"message":"hi","url":""}"#.into(),
        }
    }

    #[tokio::test]
    async fn put_then_read_back() {
        let store = SqliteFeedStore::in_memory().await.unwrap();
        store.put(record("tx1", 10)).await.unwrap();

        let got = store.get_range(10).await.unwrap();
        assert_eq!(got, vec![record("tx1", 10)]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_ignored() {
        let store = SqliteFeedStore::in_memory().await.unwrap();
        store.put(record("tx1", 10)).await.unwrap();

        let mut changed = record("tx1", 99);
        changed.content = r#"{"message":"other","url":""}"#.into();
        store.put(changed).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get_range(5).await.unwrap()[0].timestamp, 10);
    }

    #[tokio::test]
    async fn newest_first_with_insertion_tiebreak() {
        let store = SqliteFeedStore::in_memory().await.unwrap();
        store.put(record("old", 1)).await.unwrap();
        store.put(record("a", 5)).await.unwrap();
        store.put(record("b", 5)).await.unwrap();
        store.put(record("mid", 3)).await.unwrap();

        let ids: Vec<_> = store
            .get_range(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "mid", "old"]);
        assert_eq!(store.get_range(2).await.unwrap().len(), 2);
        assert!(store.get_range(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_fee_is_a_storage_error() {
        let store = SqliteFeedStore::in_memory().await.unwrap();
        let mut r = record("big", 1);
        r.fee = u64::MAX;
        assert!(matches!(store.put(r).await, Err(FeedError::Storage(_))));
    }
}

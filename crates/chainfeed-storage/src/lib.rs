//! chainfeed-storage — SQL backends for the ChainFeed feed store.
//!
//! Backends:
//! - `memory`: [`MemoryFeedStore`] from `chainfeed-core` (no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (single-file persistence)
//! - [`postgres`]: PostgreSQL via `sqlx` (pooled, production)
//!
//! [`open_store`] picks one at startup from a [`StorageBackend`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chainfeed_core::error::FeedError;
use chainfeed_core::store::{FeedStore, MemoryFeedStore};

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFeedStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresFeedStore, PostgresOptions};

// ─── Postgres connection settings ────────────────────────────────────────────

/// Discrete Postgres settings, as they come from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub enable_ssl: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            user: "user".into(),
            password: "password".into(),
            dbname: "dbname".into(),
            enable_ssl: false,
        }
    }
}

impl PostgresConfig {
    /// Connection URL in libpq form, with credentials percent-encoded.
    pub fn url(&self) -> Result<String, FeedError> {
        let mut url = url::Url::parse(&format!(
            "postgres://{}:{}/{}",
            self.host, self.port, self.dbname
        ))
        .map_err(|e| FeedError::Config(format!("invalid postgres host/dbname: {e}")))?;
        url.set_username(&self.user)
            .map_err(|_| FeedError::Config("invalid postgres user".into()))?;
        url.set_password(Some(&self.password))
            .map_err(|_| FeedError::Config("invalid postgres password".into()))?;
        url.query_pairs_mut()
            .append_pair("sslmode", if self.enable_ssl { "require" } else { "disable" });
        Ok(url.to_string())
    }
}

// ─── Backend selection ───────────────────────────────────────────────────────

/// Which store to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite { path: String },
    Postgres(PostgresConfig),
}

impl StorageBackend {
    /// Short name, matching `FeedStore::backend`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite { .. } => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }
}

/// Backend kind parsed from configuration, before its settings are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Sqlite,
    Postgres,
}

impl FromStr for BackendKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(FeedError::Config(format!("unknown storage backend {other:?}"))),
        }
    }
}

/// Open the configured store once.
pub async fn open_store(backend: &StorageBackend) -> Result<Arc<dyn FeedStore>, FeedError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryFeedStore::new())),

        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite { path } => Ok(Arc::new(SqliteFeedStore::open(path).await?)),
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite { .. } => Err(FeedError::Config(
            "built without the `sqlite` feature".into(),
        )),

        #[cfg(feature = "postgres")]
        StorageBackend::Postgres(cfg) => {
            let url = cfg.url()?;
            Ok(Arc::new(
                PostgresFeedStore::connect_with_options(&url, PostgresOptions::default()).await?,
            ))
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres(_) => Err(FeedError::Config(
            "built without the `postgres` feature".into(),
        )),
    }
}

/// Open the configured store, retrying up to `attempts` times `delay` apart.
///
/// Configuration errors are returned immediately.
pub async fn open_store_with_retry(
    backend: &StorageBackend,
    attempts: u32,
    delay: Duration,
) -> Result<Arc<dyn FeedStore>, FeedError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match open_store(backend).await {
            Ok(store) => {
                info!(backend = backend.name(), attempt, "feed store opened");
                return Ok(store);
            }
            Err(e @ FeedError::Config(_)) => return Err(e),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(
                    backend = backend.name(),
                    attempt,
                    max = attempts,
                    error = %e,
                    "failed to open feed store, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

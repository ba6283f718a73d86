//! chainfeed-core — paid message feed driven by on-chain transfers.
//!
//! # Architecture
//!
//! ```text
//! FeedService
//!     ├── ChainListener  (block stream → validate transfer → Ingestor)
//!     ├── FeeController  (epoch timer → fee decay)
//!     └── FeedManager    (fee state + connection, one lock)
//!             ├── ChainConnector / ChainClient  (upstream node)
//!             └── FeedStore  (memory / SQLite / Postgres)
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod fee;
pub mod ingest;
pub mod listener;
pub mod manager;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use chain::{
    Action, Block, BlockParser, BlockSubscription, ChainClient, ChainConnector, ConfirmedBlock,
    Transaction, Transfer, TxResult,
};
pub use config::{FeedConfig, DEFAULT_RECIPIENT};
pub use error::{FeedError, Severity};
pub use fee::{FeeController, FeePolicy, FeeState, FeeUpdate};
pub use ingest::Ingestor;
pub use listener::{BlockStats, ChainListener};
pub use manager::{ConnectionState, FeedManager, Rejection};
pub use service::FeedService;
pub use store::{FeedStore, MemoryFeedStore};
pub use types::{FeedContent, FeedEntry, FeedInfo, FeedRecord, NetworkIdentity};

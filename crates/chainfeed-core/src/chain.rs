//! Chain client traits and the decoded block model.
//!
//! The core never speaks to a node directly. A [`ChainConnector`] builds a
//! [`ChainClient`] for an endpoint URL; the client reports the network
//! identity, hands out a [`BlockParser`], and opens [`BlockSubscription`]s.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FeedError;
use crate::types::NetworkIdentity;

// ─── Block model ─────────────────────────────────────────────────────────────

/// A confirmed block with its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub height: u64,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    pub txs: Vec<Transaction>,
}

/// A transaction as seen by the feed: its id, signer and actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Signer's bech32 account string.
    pub actor: String,
    pub actions: Vec<Action>,
}

/// An action inside a transaction. Only transfers matter to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Transfer(Transfer),
    Other { kind: String },
}

/// A value transfer with an attached memo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub to: String,
    pub value: u64,
    pub memo: Vec<u8>,
}

/// Execution result for one transaction, index-aligned with `Block::txs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub success: bool,
}

/// A block together with its per-transaction results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedBlock {
    pub block: Block,
    pub results: Vec<TxResult>,
}

impl ConfirmedBlock {
    /// Iterate over transactions whose execution succeeded.
    pub fn successful_txs(&self) -> impl Iterator<Item = &Transaction> {
        self.block
            .txs
            .iter()
            .zip(self.results.iter())
            .filter(|(_, r)| r.success)
            .map(|(tx, _)| tx)
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Decoding context for raw block notifications.
pub trait BlockParser: Send + Sync {
    /// Decode one raw notification into a block and its results.
    fn parse(&self, raw: &Value) -> Result<ConfirmedBlock, FeedError>;
}

/// A live block subscription.
#[async_trait]
pub trait BlockSubscription: Send {
    /// Wait for the next confirmed block.
    ///
    /// Must be cancel-safe: the listener races this against shutdown and
    /// endpoint changes and drops the future when either fires.
    async fn next_block(&mut self, parser: &dyn BlockParser) -> Result<ConfirmedBlock, FeedError>;

    /// Close the underlying connection.
    async fn close(&mut self);
}

/// A handle to one upstream node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Endpoint URL this client talks to.
    fn endpoint(&self) -> &str;

    /// Query `(networkId, subnetId, chainId)`.
    async fn network_identity(&self) -> Result<NetworkIdentity, FeedError>;

    /// Obtain a block-decoding context.
    async fn parser(&self) -> Result<Arc<dyn BlockParser>, FeedError>;

    /// Open a block subscription and register for block notifications.
    async fn subscribe_blocks(&self) -> Result<Box<dyn BlockSubscription>, FeedError>;
}

/// Builds chain clients for endpoint URLs.
pub trait ChainConnector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainClient>, FeedError>;
}

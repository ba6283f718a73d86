//! Scripted in-process chain for tests and local demos.
//!
//! [`MockConnector`] hands out [`MockNode`]s by endpoint URL. Blocks pushed
//! onto a node are delivered, in order, to whichever subscription is open
//! on that node, so a test can drive the listener block by block.
//!
//! Built only for this crate's tests and with the `testing` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::chain::{
    Action, Block, BlockParser, BlockSubscription, ChainClient, ChainConnector, ConfirmedBlock,
    Transaction, Transfer, TxResult,
};
use crate::error::FeedError;
use crate::types::NetworkIdentity;

/// Build a memo the way a wallet would: JSON `{message, url}`.
pub fn memo(message: &str, url: &str) -> Vec<u8> {
    serde_json::json!({ "message": message, "url": url })
        .to_string()
        .into_bytes()
}

/// A one-action transaction paying `to`, plus a copy of the transfer.
pub fn transfer_tx(id: &str, to: &str, value: u64, memo: &[u8]) -> (Transaction, Transfer) {
    let transfer = Transfer {
        to: to.to_string(),
        value,
        memo: memo.to_vec(),
    };
    let tx = Transaction {
        id: id.to_string(),
        actor: format!("nuklai1actor{}", id.len()),
        actions: vec![Action::Transfer(transfer.clone())],
    };
    (tx, transfer)
}

/// Wire shape the mock parser understands.
#[derive(Serialize, Deserialize)]
struct MockNotification {
    block: Block,
    results: Vec<TxResult>,
}

type Feed = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Value, String>>>>;

/// One scripted node.
pub struct MockNode {
    endpoint: String,
    identity: NetworkIdentity,
    tx: mpsc::UnboundedSender<Result<Value, String>>,
    rx: Feed,
    subscribe_failures: AtomicU32,
    subscriptions: AtomicU32,
}

impl MockNode {
    /// Queue a block with every transaction marked as successful.
    pub fn push_block(&self, height: u64, timestamp: i64, txs: Vec<Transaction>) {
        let results = vec![TxResult { success: true }; txs.len()];
        let block = Block {
            id: format!("block-{height}"),
            height,
            timestamp,
            txs,
        };
        self.push_confirmed(block, results);
    }

    /// Queue a block with explicit per-transaction results.
    pub fn push_confirmed(&self, block: Block, results: Vec<TxResult>) {
        let raw = serde_json::to_value(MockNotification { block, results })
            .unwrap_or(Value::Null);
        let _ = self.tx.send(Ok(raw));
    }

    /// Queue a raw notification (e.g. something the parser should reject).
    pub fn push_raw(&self, raw: Value) {
        let _ = self.tx.send(Ok(raw));
    }

    /// Queue a read failure.
    pub fn push_read_error(&self, reason: &str) {
        let _ = self.tx.send(Err(reason.to_string()));
    }

    /// Make the next `n` subscribe attempts fail.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.subscribe_failures.store(n, Ordering::SeqCst);
    }

    /// Number of subscriptions successfully opened so far.
    pub fn subscription_count(&self) -> u32 {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockNode {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn network_identity(&self) -> Result<NetworkIdentity, FeedError> {
        Ok(self.identity.clone())
    }

    async fn parser(&self) -> Result<Arc<dyn BlockParser>, FeedError> {
        Ok(Arc::new(MockParser))
    }

    async fn subscribe_blocks(&self) -> Result<Box<dyn BlockSubscription>, FeedError> {
        let remaining = self.subscribe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.subscribe_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(FeedError::Connection {
                endpoint: self.endpoint.clone(),
                reason: "scripted subscribe failure".into(),
            });
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSubscription {
            rx: Arc::clone(&self.rx),
            closed: false,
        }))
    }
}

struct MockParser;

impl BlockParser for MockParser {
    fn parse(&self, raw: &Value) -> Result<ConfirmedBlock, FeedError> {
        let n: MockNotification =
            serde_json::from_value(raw.clone()).map_err(|e| FeedError::Parse(e.to_string()))?;
        Ok(ConfirmedBlock {
            block: n.block,
            results: n.results,
        })
    }
}

struct MockSubscription {
    rx: Feed,
    closed: bool,
}

#[async_trait]
impl BlockSubscription for MockSubscription {
    async fn next_block(&mut self, parser: &dyn BlockParser) -> Result<ConfirmedBlock, FeedError> {
        if self.closed {
            return Err(FeedError::Read("subscription closed".into()));
        }
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(Ok(raw)) => parser.parse(&raw),
            Some(Err(reason)) => Err(FeedError::Read(reason)),
            None => Err(FeedError::Read("node went away".into())),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// Connector over a set of scripted nodes. Unknown endpoints are unreachable.
#[derive(Default)]
pub struct MockConnector {
    nodes: Mutex<HashMap<String, Arc<MockNode>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reachable node at `endpoint`.
    pub fn add_node(&self, endpoint: &str, subnet_id: &str, chain_id: &str) -> Arc<MockNode> {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Arc::new(MockNode {
            endpoint: endpoint.to_string(),
            identity: NetworkIdentity {
                network_id: 1337,
                subnet_id: subnet_id.to_string(),
                chain_id: chain_id.to_string(),
            },
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            subscribe_failures: AtomicU32::new(0),
            subscriptions: AtomicU32::new(0),
        });
        self.nodes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Arc::clone(&node));
        node
    }

    /// Look up a registered node.
    pub fn node(&self, endpoint: &str) -> Option<Arc<MockNode>> {
        self.nodes.lock().unwrap().get(endpoint).cloned()
    }
}

impl ChainConnector for MockConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainClient>, FeedError> {
        self.node(endpoint)
            .map(|n| n as Arc<dyn ChainClient>)
            .ok_or_else(|| FeedError::Connection {
                endpoint: endpoint.to_string(),
                reason: "no such node".into(),
            })
    }
}

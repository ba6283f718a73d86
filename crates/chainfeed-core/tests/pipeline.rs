//! End-to-end runs of the listener and fee controller against scripted nodes.

use std::sync::Arc;
use std::time::Duration;

use chainfeed_core::chain::{Block, TxResult};
use chainfeed_core::testing::{memo, transfer_tx, MockConnector, MockNode};
use chainfeed_core::{FeedConfig, FeedManager, FeedService, MemoryFeedStore, DEFAULT_RECIPIENT};
use tokio_util::sync::CancellationToken;

const NODE_A: &str = "http://node-a:9650";
const NODE_B: &str = "http://node-b:9650";

struct Harness {
    service: FeedService,
    connector: Arc<MockConnector>,
    node: Arc<MockNode>,
    store: Arc<MemoryFeedStore>,
}

impl Harness {
    fn manager(&self) -> &Arc<FeedManager> {
        self.service.manager()
    }
}

fn fast_config() -> FeedConfig {
    FeedConfig {
        rpc_url: NODE_A.into(),
        read_backoff_ms: 10,
        reconnect_backoff_ms: 10,
        block_pause_ms: 1,
        ..Default::default()
    }
}

async fn start(prepare: impl FnOnce(&MockNode)) -> Harness {
    let connector = Arc::new(MockConnector::new());
    let node = connector.add_node(NODE_A, "subnet-a", "chain-a");
    prepare(&node);
    let store = Arc::new(MemoryFeedStore::new());
    let manager = FeedManager::new(fast_config(), connector.clone(), store.clone())
        .await
        .unwrap();
    let service = FeedService::start(Arc::new(manager), CancellationToken::new());
    Harness {
        service,
        connector,
        node,
        store,
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn paid_messages_reach_the_feed() {
    let h = start(|_| {}).await;

    let (paid, _) = transfer_tx("paid", DEFAULT_RECIPIENT, 1_000_000, &memo("gm", "https://nukl.ai"));
    let (cheap, _) = transfer_tx("cheap", DEFAULT_RECIPIENT, 999_999, &memo("too cheap", ""));
    let (stranger, _) = transfer_tx("stranger", "nuklai1someoneelse", 5_000_000, &memo("hi", ""));
    h.node.push_block(1, 1_700_000_000, vec![paid, cheap, stranger]);

    eventually("entry stored", || h.store.len() == 1).await;
    let feed = h.manager().feed(10).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].id, "paid");
    assert_eq!(feed[0].chain_id, "chain-a");
    assert_eq!(feed[0].content.url, "https://nukl.ai");
    assert_eq!(h.manager().fee_state().await.epoch_messages, 1);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_transactions_are_skipped() {
    let h = start(|_| {}).await;

    let (failed, _) = transfer_tx("failed", DEFAULT_RECIPIENT, 1_000_000, &memo("x", ""));
    let (ok, _) = transfer_tx("ok", DEFAULT_RECIPIENT, 1_000_000, &memo("y", ""));
    h.node.push_confirmed(
        Block {
            id: "b1".into(),
            height: 1,
            timestamp: 10,
            txs: vec![failed, ok],
        },
        vec![TxResult { success: false }, TxResult { success: true }],
    );

    eventually("entry stored", || h.store.len() == 1).await;
    assert_eq!(h.manager().feed(10).await.unwrap()[0].id, "ok");
    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn newest_entries_come_first() {
    let h = start(|_| {}).await;
    for height in 1..=3u64 {
        let (tx, _) = transfer_tx(&format!("tx{height}"), DEFAULT_RECIPIENT, 1_000_000, &memo("m", ""));
        h.node.push_block(height, 100 * height as i64, vec![tx]);
    }

    eventually("three entries", || h.store.len() == 3).await;
    let ids: Vec<_> = h
        .manager()
        .feed(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["tx3", "tx2", "tx1"]);
    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn listener_recovers_from_read_and_parse_errors() {
    let h = start(|_| {}).await;

    h.node.push_read_error("connection reset");
    h.node.push_raw(serde_json::json!({ "garbage": true }));
    let (tx, _) = transfer_tx("after", DEFAULT_RECIPIENT, 1_000_000, &memo("still here", ""));
    h.node.push_block(2, 20, vec![tx]);

    eventually("entry after errors", || h.store.len() == 1).await;
    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn listener_retries_subscription() {
    let h = start(|node| node.fail_next_subscribes(3)).await;

    let (tx, _) = transfer_tx("late", DEFAULT_RECIPIENT, 1_000_000, &memo("m", ""));
    h.node.push_block(1, 10, vec![tx]);

    eventually("entry after reconnect", || h.store.len() == 1).await;
    assert_eq!(h.node.subscription_count(), 1);
    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn endpoint_swap_moves_the_listener() {
    let h = start(|_| {}).await;
    let node_b = h.connector.add_node(NODE_B, "subnet-b", "chain-b");
    eventually("subscribed to a", || h.node.subscription_count() == 1).await;

    h.manager().update_endpoint(NODE_B, "ADMIN_TOKEN").await.unwrap();
    eventually("subscribed to b", || node_b.subscription_count() == 1).await;

    // Node A is no longer followed.
    let (old, _) = transfer_tx("on-a", DEFAULT_RECIPIENT, 1_000_000, &memo("m", ""));
    h.node.push_block(5, 50, vec![old]);
    let (new, _) = transfer_tx("on-b", DEFAULT_RECIPIENT, 1_000_000, &memo("m", ""));
    node_b.push_block(1, 60, vec![new]);

    eventually("entry from b", || h.store.len() >= 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let feed = h.manager().feed(10).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].id, "on-b");
    assert_eq!(feed[0].chain_id, "chain-b");
    assert_eq!(h.node.subscription_count(), 1);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_swap_keeps_following_old_node() {
    let h = start(|_| {}).await;
    h.connector.add_node(NODE_B, "subnet-b", "chain-b");
    eventually("subscribed to a", || h.node.subscription_count() == 1).await;

    assert!(h.manager().update_endpoint(NODE_B, "nope").await.is_err());

    let (tx, _) = transfer_tx("still-a", DEFAULT_RECIPIENT, 1_000_000, &memo("m", ""));
    h.node.push_block(1, 10, vec![tx]);
    eventually("entry from a", || h.store.len() == 1).await;
    assert_eq!(h.manager().connection().await.endpoint, NODE_A);
    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_interrupts_a_blocked_read() {
    let h = start(|_| {}).await;
    eventually("subscribed", || h.node.subscription_count() == 1).await;

    let stopped = tokio::time::timeout(Duration::from_secs(2), h.service.shutdown()).await;
    assert!(matches!(stopped, Ok(Ok(()))));
}

//! WebSocket block subscription.
//!
//! One socket per subscription. After connecting, a
//! `hypersdk.subscribeBlocks` request registers for blocks; the node then
//! pushes `hypersdk.block` notifications. A closed or broken socket is
//! reported as a connection error so the listener reopens it.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use async_trait::async_trait;
use chainfeed_core::chain::{BlockParser, BlockSubscription, ConfirmedBlock};
use chainfeed_core::error::FeedError;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse, RpcId};

pub const SUBSCRIBE_METHOD: &str = "hypersdk.subscribeBlocks";
pub const BLOCK_METHOD: &str = "hypersdk.block";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live `hypersdk.subscribeBlocks` stream.
pub struct WsBlockSubscription {
    url: String,
    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
    subscribe_id: u64,
}

impl WsBlockSubscription {
    /// Connect to `url` and register for blocks.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        tracing::info!(url, "connecting via WebSocket");
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let (mut sink, stream) = socket.split();

        let subscribe_id = 1;
        let req = JsonRpcRequest::new(subscribe_id, SUBSCRIBE_METHOD, Value::Null);
        let text = serde_json::to_string(&req)?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            sink,
            stream,
            subscribe_id,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn lost(&self, reason: impl Into<String>) -> FeedError {
        FeedError::Connection {
            endpoint: self.url.clone(),
            reason: reason.into(),
        }
    }

    /// Decide what one text frame means. `Ok(None)` = not a block.
    fn handle_text(
        &self,
        text: &str,
        parser: &dyn BlockParser,
    ) -> Result<Option<ConfirmedBlock>, FeedError> {
        let val: Value =
            serde_json::from_str(text).map_err(|e| FeedError::Parse(format!("WS frame: {e}")))?;

        if val.get("method").and_then(Value::as_str) == Some(BLOCK_METHOD) {
            let params = val.get("params").cloned().unwrap_or(Value::Null);
            return parser.parse(&params).map(Some);
        }

        // Reply to our subscribe request.
        if let Ok(resp) = serde_json::from_value::<JsonRpcResponse>(val) {
            if resp.id == RpcId::Number(self.subscribe_id) {
                if let Some(err) = resp.error {
                    return Err(FeedError::Rpc(format!("subscribe rejected: {err}")));
                }
                tracing::debug!(url = %self.url, "block subscription acknowledged");
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl BlockSubscription for WsBlockSubscription {
    async fn next_block(&mut self, parser: &dyn BlockParser) -> Result<ConfirmedBlock, FeedError> {
        loop {
            match self.stream.next().await {
                None => return Err(self.lost("stream closed")),
                Some(Err(e)) => return Err(self.lost(e.to_string())),
                Some(Ok(Message::Close(_))) => return Err(self.lost("closed by node")),
                Some(Ok(Message::Text(text))) => {
                    if let Some(block) = self.handle_text(&text, parser)? {
                        return Ok(block);
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if let Some(block) = self.handle_text(&text, parser)? {
                        return Ok(block);
                    }
                }
                Some(Ok(_)) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(url = %self.url, error = %e, "error closing WebSocket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainfeed_core::chain::Action;
    use chainfeed_core::types::NetworkIdentity;
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::parser::JsonBlockParser;

    fn parser() -> JsonBlockParser {
        JsonBlockParser::new(NetworkIdentity {
            network_id: 1,
            subnet_id: "s".into(),
            chain_id: "c".into(),
        })
    }

    /// Accept one socket, check the subscribe request, push `frames`, close.
    async fn node(frames: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let Some(Ok(Message::Text(req))) = ws.next().await else {
                panic!("expected subscribe request");
            };
            let req: JsonRpcRequest = serde_json::from_str(&req).unwrap();
            assert_eq!(req.method, SUBSCRIBE_METHOD);
            for frame in frames {
                ws.send(Message::Text(frame)).await.unwrap();
            }
            let _ = ws.close(None).await;
        });
        format!("ws://{addr}/corews")
    }

    #[tokio::test]
    async fn delivers_blocks_and_reports_close() {
        let memo = hex::encode(br#"{"message":"hi","url":""}"#);
        let block = json!({
            "jsonrpc": "2.0",
            "method": BLOCK_METHOD,
            "params": {
                "block": {
                    "id": "b1", "height": 1, "timestamp": 5,
                    "txs": [{ "id": "t1", "actor": "nuklai1a", "actions": [
                        { "type": "transfer", "to": "nuklai1feed", "value": 7, "memo": memo }
                    ]}]
                },
                "results": [{ "success": true }]
            }
        });
        let ack = json!({ "jsonrpc": "2.0", "id": 1, "result": true });
        let url = node(vec![ack.to_string(), block.to_string()]).await;

        let mut sub = WsBlockSubscription::connect(&url).await.unwrap();
        let confirmed = sub.next_block(&parser()).await.unwrap();
        assert_eq!(confirmed.block.id, "b1");
        assert!(matches!(confirmed.block.txs[0].actions[0], Action::Transfer(_)));

        let err = sub.next_block(&parser()).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn rejected_subscription_is_an_rpc_error() {
        let nack = json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32601, "message": "Method not found" }
        });
        let url = node(vec![nack.to_string()]).await;

        let mut sub = WsBlockSubscription::connect(&url).await.unwrap();
        assert!(matches!(sub.next_block(&parser()).await, Err(FeedError::Rpc(_))));
    }

    #[tokio::test]
    async fn unreachable_node_fails_to_connect() {
        let err = WsBlockSubscription::connect("ws://127.0.0.1:1/corews")
            .await
            .err()
            .unwrap();
        assert!(err.is_retryable());
    }
}

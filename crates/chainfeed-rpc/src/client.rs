//! `ChainClient` over a node's JSON-RPC (HTTP) and block stream (WebSocket)
//! endpoints.
//!
//! For a node URL `http://host:9650/ext/bc/nuklai`:
//! - identity queries go to `POST http://host:9650/ext/bc/nuklai/coreapi`
//! - blocks stream from `ws://host:9650/ext/bc/nuklai/corews`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use chainfeed_core::chain::{BlockParser, BlockSubscription, ChainClient, ChainConnector};
use chainfeed_core::error::FeedError;
use chainfeed_core::types::NetworkIdentity;

use crate::error::TransportError;
use crate::parser::JsonBlockParser;
use crate::transport::{HttpRpcClient, RpcTransport};
use crate::ws::WsBlockSubscription;

pub const NETWORK_METHOD: &str = "hypersdk.network";
const CORE_API_PATH: &str = "coreapi";
const CORE_WS_PATH: &str = "corews";

/// Parse a node URL. Only `http` and `https` are accepted.
pub fn parse_node_url(endpoint: &str) -> Result<Url, TransportError> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| TransportError::InvalidUrl(format!("{endpoint:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransportError::InvalidUrl(format!(
            "{endpoint:?}: unsupported scheme {other:?}"
        ))),
    }
}

/// `base` with `segment` appended to its path.
fn join(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}/{segment}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url
}

/// The HTTP API URL for a node.
pub fn core_api_url(base: &Url) -> Url {
    join(base, CORE_API_PATH)
}

/// The WebSocket URL for a node: same host and path, `ws`/`wss` scheme.
pub fn core_ws_url(base: &Url) -> Result<Url, TransportError> {
    let mut url = join(base, CORE_WS_PATH);
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidUrl(format!("cannot derive {scheme} URL from {base}")))?;
    Ok(url)
}

/// A JSON-RPC backed [`ChainClient`].
pub struct JsonRpcChainClient {
    endpoint: String,
    api: HttpRpcClient,
    ws_url: Url,
    parser: OnceCell<Arc<JsonBlockParser>>,
}

impl JsonRpcChainClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base = parse_node_url(endpoint)?;
        let api = HttpRpcClient::new(core_api_url(&base).to_string(), timeout)?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            api,
            ws_url: core_ws_url(&base)?,
            parser: OnceCell::new(),
        })
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn network_identity(&self) -> Result<NetworkIdentity, FeedError> {
        self.api
            .call(NETWORK_METHOD, Value::Null)
            .await
            .map_err(|e| e.into_feed_error(&self.endpoint))
    }

    async fn parser(&self) -> Result<Arc<dyn BlockParser>, FeedError> {
        let parser = self
            .parser
            .get_or_try_init(|| async {
                let identity = self.network_identity().await?;
                tracing::debug!(chain_id = %identity.chain_id, "block parser ready");
                Ok::<_, FeedError>(Arc::new(JsonBlockParser::new(identity)))
            })
            .await?;
        Ok(parser.clone() as Arc<dyn BlockParser>)
    }

    async fn subscribe_blocks(&self) -> Result<Box<dyn BlockSubscription>, FeedError> {
        let sub = WsBlockSubscription::connect(self.ws_url.as_str())
            .await
            .map_err(|e| e.into_feed_error(&self.endpoint))?;
        Ok(Box::new(sub))
    }
}

/// Builds [`JsonRpcChainClient`]s.
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    timeout: Duration,
}

impl JsonRpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for JsonRpcConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ChainConnector for JsonRpcConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainClient>, FeedError> {
        let client =
            JsonRpcChainClient::new(endpoint, self.timeout).map_err(|e| e.into_feed_error(endpoint))?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn derives_api_and_ws_urls() {
        let base = parse_node_url("https://rpc.example.com/ext/bc/nuklai/").unwrap();
        assert_eq!(
            core_api_url(&base).as_str(),
            "https://rpc.example.com/ext/bc/nuklai/coreapi"
        );
        assert_eq!(
            core_ws_url(&base).unwrap().as_str(),
            "wss://rpc.example.com/ext/bc/nuklai/corews"
        );

        let local = parse_node_url("http://127.0.0.1:9650").unwrap();
        assert_eq!(core_ws_url(&local).unwrap().as_str(), "ws://127.0.0.1:9650/corews");
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(parse_node_url("ftp://node").is_err());
        assert!(parse_node_url("not a url").is_err());
        let err = JsonRpcConnector::default().connect("ws://node").err().unwrap();
        assert!(matches!(err, FeedError::Config(_)));
    }

    #[tokio::test]
    async fn queries_network_identity() {
        let router = Router::new().route(
            "/coreapi",
            post(|Json(req): Json<Value>| async move {
                assert_eq!(req["method"], NETWORK_METHOD);
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": req["id"],
                    "result": { "networkId": 5, "subnetId": "sub", "chainId": "chn" }
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = JsonRpcConnector::default()
            .connect(&format!("http://{addr}"))
            .unwrap();
        let identity = client.network_identity().await.unwrap();
        assert_eq!(identity.network_id, 5);
        assert_eq!(identity.chain_id, "chn");

        let first = client.parser().await.unwrap();
        let second = client.parser().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn unreachable_node_is_a_connection_error() {
        let client = JsonRpcConnector::new(Duration::from_secs(2))
            .connect("http://127.0.0.1:1")
            .unwrap();
        assert!(client.network_identity().await.unwrap_err().is_connection());
    }
}

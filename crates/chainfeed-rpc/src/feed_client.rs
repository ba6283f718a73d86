//! Typed client for a running feed server's JSON-RPC API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use chainfeed_core::types::{FeedEntry, FeedInfo};

use crate::error::TransportError;
use crate::transport::{HttpRpcClient, RpcTransport};

/// Path the feed API is served under.
pub const FEED_ENDPOINT: &str = "/feed";
/// Namespace prefix on method names.
pub const NAMESPACE: &str = "feed";

/// Params of `feed.feed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedArgs {
    #[serde(rename = "subnetID", default)]
    pub subnet_id: String,
    #[serde(rename = "chainID", default)]
    pub chain_id: String,
    #[serde(default)]
    pub limit: i64,
}

/// Reply of `feed.feed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedReply {
    #[serde(default)]
    pub feed: Vec<FeedEntry>,
}

/// Params of `feed.updateNuklaiRPC`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRpcArgs {
    #[serde(rename = "nuklaiRPCUrl")]
    pub nuklai_rpc_url: String,
    pub admin_token: String,
}

/// Reply of `feed.updateNuklaiRPC`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRpcReply {
    pub success: bool,
}

/// Client for the feed API, generic over the transport.
pub struct FeedClient<T: RpcTransport = HttpRpcClient> {
    transport: T,
}

impl FeedClient<HttpRpcClient> {
    /// Client for the server at `uri` (e.g. `http://localhost:10592`).
    pub fn new(uri: &str) -> Result<Self, TransportError> {
        let url = format!("{}{FEED_ENDPOINT}", uri.trim_end_matches('/'));
        Ok(Self::with_transport(HttpRpcClient::new(
            url,
            Duration::from_secs(30),
        )?))
    }
}

impl<T: RpcTransport> FeedClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Recipient address and the fee currently required.
    pub async fn feed_info(&self) -> Result<FeedInfo, TransportError> {
        self.transport
            .call(&format!("{NAMESPACE}.feedInfo"), json!({}))
            .await
    }

    /// Up to `limit` most recent entries, newest first.
    pub async fn feed(
        &self,
        subnet_id: &str,
        chain_id: &str,
        limit: i64,
    ) -> Result<Vec<FeedEntry>, TransportError> {
        let args = FeedArgs {
            subnet_id: subnet_id.to_string(),
            chain_id: chain_id.to_string(),
            limit,
        };
        let reply: FeedReply = self
            .transport
            .call(&format!("{NAMESPACE}.feed"), serde_json::to_value(args)?)
            .await?;
        Ok(reply.feed)
    }

    /// Point the server at a different node. Needs the admin token.
    pub async fn update_nuklai_rpc(
        &self,
        new_url: &str,
        admin_token: &str,
    ) -> Result<bool, TransportError> {
        let args = UpdateRpcArgs {
            nuklai_rpc_url: new_url.to_string(),
            admin_token: admin_token.to_string(),
        };
        let reply: UpdateRpcReply = self
            .transport
            .call(
                &format!("{NAMESPACE}.updateNuklaiRPC"),
                serde_json::to_value(args)?,
            )
            .await?;
        Ok(reply.success)
    }
}

//! JSON-RPC method dispatch for the feed API.
//!
//! Methods are accepted with or without the `feed.` namespace prefix:
//! `feedInfo`, `feed`, `updateNuklaiRPC`.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use chainfeed_core::error::FeedError;
use chainfeed_core::manager::FeedManager;
use chainfeed_rpc::feed_client::{FeedArgs, FeedReply, UpdateRpcArgs, NAMESPACE};
use chainfeed_rpc::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

/// Handle one raw request body.
pub async fn handle_body(manager: &FeedManager, body: &[u8]) -> JsonRpcResponse {
    match serde_json::from_slice::<JsonRpcRequest>(body) {
        Ok(req) => handle_request(manager, req).await,
        Err(e) => {
            debug!(error = %e, "unparseable JSON-RPC request");
            JsonRpcResponse::failure(
                RpcId::Null,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, "Parse error"),
            )
        }
    }
}

/// Dispatch a parsed request.
pub async fn handle_request(manager: &FeedManager, req: JsonRpcRequest) -> JsonRpcResponse {
    let id = req.id.clone();
    match dispatch(manager, &req).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    }
}

fn method_name(method: &str) -> &str {
    method
        .strip_prefix(NAMESPACE)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(method)
}

fn params<T: DeserializeOwned>(req: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    let raw = match req.named_params() {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(raw)
        .map_err(|_| JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "Invalid params"))
}

fn server_error(e: &FeedError) -> JsonRpcError {
    JsonRpcError::new(JsonRpcError::SERVER_ERROR, e.to_string())
}

fn to_result(value: impl serde::Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(JsonRpcError::SERVER_ERROR, e.to_string()))
}

async fn dispatch(manager: &FeedManager, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    match method_name(&req.method) {
        "feedInfo" => to_result(manager.feed_info().await),

        "feed" => {
            // subnetID/chainID are accepted for compatibility and not used
            // for filtering.
            let args: FeedArgs = params(req)?;
            let feed = manager.feed(args.limit).await.map_err(|e| {
                warn!(error = %e, "feed query failed");
                server_error(&e)
            })?;
            to_result(FeedReply { feed })
        }

        "updateNuklaiRPC" => {
            let args: UpdateRpcArgs = params(req)?;
            manager
                .update_endpoint(&args.nuklai_rpc_url, &args.admin_token)
                .await
                .map_err(|e| server_error(&e))?;
            Ok(json!({ "success": true }))
        }

        other => {
            debug!(method = other, "unknown JSON-RPC method");
            Err(JsonRpcError::new(
                JsonRpcError::METHOD_NOT_FOUND,
                "Method not found",
            ))
        }
    }
}

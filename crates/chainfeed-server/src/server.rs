//! axum router and server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use chainfeed_core::manager::FeedManager;
use chainfeed_rpc::feed_client::FEED_ENDPOINT;
use chainfeed_rpc::request::JsonRpcResponse;

use crate::handler;

#[derive(Clone)]
struct AppState {
    manager: Arc<FeedManager>,
}

/// Build the HTTP router for `manager`.
pub fn build_app(manager: Arc<FeedManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", post(rpc))
        .route(FEED_ENDPOINT, post(rpc))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { manager })
}

async fn health() -> &'static str {
    "OK"
}

async fn rpc(State(state): State<AppState>, body: Bytes) -> Json<JsonRpcResponse> {
    Json(handler::handle_body(&state.manager, &body).await)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    manager: Arc<FeedManager>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "feed API listening");

    axum::serve(listener, build_app(manager))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("feed API shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

//! Errors raised by the HTTP and WebSocket clients.

use thiserror::Error;

use chainfeed_core::error::FeedError;

use crate::request::JsonRpcError;

/// Errors that can occur talking to a node or a feed server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// POST to the node or feed server failed, or came back with a
    /// non-JSON error status.
    #[error("http request failed: {0}")]
    Http(String),

    /// Block socket could not be opened or written to.
    #[error("websocket: {0}")]
    WebSocket(String),

    /// The remote side answered with a JSON-RPC error object.
    #[error("remote returned {0}")]
    Rpc(JsonRpcError),

    #[error("no reply within {ms}ms")]
    Timeout { ms: u64 },

    /// Reply body or result did not have the expected shape.
    #[error("unexpected reply shape: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Endpoint URL is malformed or uses an unsupported scheme.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Network-level failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. }
        )
    }

    /// Map into the pipeline's error type, tagging network failures with
    /// the endpoint they happened on.
    pub fn into_feed_error(self, endpoint: &str) -> FeedError {
        match self {
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. } => FeedError::Connection {
                endpoint: endpoint.to_string(),
                reason: self.to_string(),
            },
            Self::Rpc(e) => FeedError::Rpc(e.to_string()),
            Self::Deserialization(e) => FeedError::Parse(e.to_string()),
            Self::InvalidUrl(reason) => FeedError::Config(reason),
            Self::Other(reason) => FeedError::Other(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainfeed_core::error::Severity;

    #[test]
    fn network_failures_become_recoverable_connection_errors() {
        let err = TransportError::WebSocket("reset".into()).into_feed_error("http://n:9650");
        assert!(err.is_connection());
        assert_eq!(err.severity(), Severity::Recoverable);
    }

    #[test]
    fn bad_url_is_a_config_error() {
        let err = TransportError::InvalidUrl("ftp://x".into()).into_feed_error("ftp://x");
        assert!(matches!(err, FeedError::Config(_)));
    }
}

//! Error types for the feed pipeline.

use thiserror::Error;

/// How the listener supervisor should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Log, back off, and try again on the next pass.
    Recoverable,
    /// Stop the listener and surface the error to the process.
    Fatal,
}

/// Errors that can occur while following the chain or serving the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("block stream read failed: {0}")]
    Read(String),

    #[error("block parse error: {0}")]
    Parse(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("feed content could not be decoded: {0}")]
    Content(String),

    #[error("unauthorized user")]
    Unauthorized,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl FeedError {
    /// Classify the error for the listener supervisor.
    ///
    /// Anything caused by the upstream node or the network is recoverable;
    /// configuration problems are not.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Connection { .. } | Self::Read(_) | Self::Parse(_) | Self::Rpc(_) => {
                Severity::Recoverable
            }
            Self::Storage(_) | Self::Content(_) | Self::Other(_) => Severity::Recoverable,
            Self::Unauthorized | Self::Config(_) => Severity::Fatal,
        }
    }

    /// Returns `true` if the supervisor should retry after this error.
    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Recoverable
    }

    /// Returns `true` for errors raised while opening or re-opening a subscription.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_failures_are_recoverable() {
        let err = FeedError::Connection {
            endpoint: "http://localhost:9650".into(),
            reason: "refused".into(),
        };
        assert!(err.is_recoverable());
        assert!(err.is_connection());
        assert!(FeedError::Read("eof".into()).is_recoverable());
    }

    #[test]
    fn config_errors_are_fatal() {
        assert_eq!(FeedError::Config("bad".into()).severity(), Severity::Fatal);
        assert_eq!(FeedError::Unauthorized.to_string(), "unauthorized user");
    }
}

//! chainfeed-server — HTTP front end for a [`FeedManager`].
//!
//! ```text
//! POST /        JSON-RPC 2.0
//! POST /feed    JSON-RPC 2.0 (same methods)
//! GET  /health  "OK"
//! ```
//!
//! [`FeedManager`]: chainfeed_core::manager::FeedManager

pub mod handler;
pub mod server;

pub use server::{build_app, serve, shutdown_signal};

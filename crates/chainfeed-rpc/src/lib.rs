//! chainfeed-rpc — wire layer for ChainFeed.
//!
//! - [`client`]: `ChainClient`/`ChainConnector` over a node's JSON-RPC
//!   API (`reqwest`) and block stream (`tokio-tungstenite`)
//! - [`feed_client`]: typed client for the feed server's own API
//! - [`request`]: JSON-RPC 2.0 wire types shared with the server

pub mod client;
pub mod error;
pub mod feed_client;
pub mod parser;
pub mod request;
pub mod transport;
pub mod ws;

pub use client::{JsonRpcChainClient, JsonRpcConnector};
pub use error::TransportError;
pub use feed_client::{FeedArgs, FeedClient, FeedReply, UpdateRpcArgs, UpdateRpcReply};
pub use parser::JsonBlockParser;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::{HttpRpcClient, RpcTransport};
pub use ws::WsBlockSubscription;

//! JSON-RPC 2.0 serving surface (newline-delimited, stdio transport).

pub mod server;
pub mod types;

pub use server::NetworkServer;
pub use types::{JsonRpcRequest, JsonRpcResponse, StrategySettings};

//! Protocol-level building blocks shared by the Meilisearch MCP transports.

pub mod auth;
pub mod error;
pub mod jsonrpc;

pub use auth::AuthGate;
pub use error::ProtocolError;
pub use jsonrpc::{ErrorObject, JsonRpcRequest, JsonRpcResponse, RejectedRequest};

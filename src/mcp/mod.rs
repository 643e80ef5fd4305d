//! Model Context Protocol (MCP) implementation
//!
//! JSON-RPC 2.0 envelopes, method dispatch, and the three note tools.
//! Transport-agnostic; the HTTP/SSE transport lives in [`crate::api`].

pub mod dispatcher;
pub mod protocol;
pub mod tools;

pub use dispatcher::{RpcDispatcher, PROTOCOL_VERSION};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use tools::{ToolHandler, ToolName};

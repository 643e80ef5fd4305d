//! Memory Bridge - MCP over Server-Sent Events for note memory
//!
//! Lets MCP agent clients store, search, and list personal notes through a
//! stream-plus-POST transport:
//! - Each client opens an SSE stream and is told where to POST requests
//! - Requests are dispatched as JSON-RPC 2.0 and answered on the stream
//! - Notes live in a libSQL store; an optional search backend ranks them
//!
//! # Architecture
//!
//! - **Types**: Identities, notes, metadata
//! - **Storage**: API key validation and the durable note store
//! - **Services**: Semantic search backend client
//! - **MCP**: JSON-RPC envelopes, dispatch, tool handlers
//! - **API**: Session registry, stream transport, HTTP endpoints
//!
//! # Example
//!
//! ```ignore
//! use memory_bridge::{api, mcp, storage::libsql::LibsqlStore, BridgeConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::default();
//!     let store = Arc::new(LibsqlStore::open(&config.database.path).await?);
//!     let dispatcher = Arc::new(mcp::RpcDispatcher::new(mcp::ToolHandler::new(store.clone(), None)));
//!
//!     let shutdown = CancellationToken::new();
//!     let state = api::AppState::new(&config.server, dispatcher, store, shutdown.clone());
//!     api::serve(config.server.addr, state, shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod mcp;
pub mod services;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use storage::{IdentityResolver, NoteQuery, NoteStore};
pub use types::{Caller, Identity, Note, NoteId, NoteMetadata, SearchHit, WorkspaceId};

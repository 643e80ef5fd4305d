//! HTTP/SSE transport for MCP clients
//!
//! Provides:
//! - Server-Sent Events streams, one session per stream
//! - Per-session message relay endpoint
//! - Synchronous RPC endpoint and health check

pub mod server;
pub mod sessions;
pub mod stream;

pub use server::{router, serve, AppState, HealthResponse};
pub use sessions::{Session, SessionId, SessionRegistry};
pub use stream::{Frame, StreamTransport};

//! Session registry
//!
//! A session binds one open event stream to the identity that opened it and
//! to the queue its responses are delivered through. Sessions exist only in
//! memory and only for as long as their stream is open.

use crate::error::{BridgeError, Result};
use crate::mcp::JsonRpcResponse;
use crate::types::Identity;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Opaque session identifier, unguessable and unique per process lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One live session
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub identity: Identity,
    /// Client name taken from the stream URL
    pub client: String,
    pub created_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<JsonRpcResponse>,
}

impl Session {
    /// Queue a response for delivery on this session's stream
    ///
    /// Fails only when the stream has already gone away.
    pub fn enqueue(&self, response: JsonRpcResponse) -> Result<()> {
        self.outbound
            .send(response)
            .map_err(|_| BridgeError::InvalidSession(self.id.to_string()))
    }
}

/// Registry of live sessions, shared by all handlers
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and hand back the receiving end of its queue
    pub async fn create(
        &self,
        identity: Identity,
        client: &str,
    ) -> (SessionId, mpsc::UnboundedReceiver<JsonRpcResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SessionId::generate();

        let session = Arc::new(Session {
            id: id.clone(),
            identity,
            client: client.to_string(),
            created_at: Utc::now(),
            outbound: tx,
        });

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), session);
        debug!("Session {} registered ({} live)", id, sessions.len());

        (id, rx)
    }

    /// Look up a live session
    pub async fn get(&self, id: &SessionId) -> Result<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::InvalidSession(id.to_string()))
    }

    /// Remove a session; removing an absent id is a no-op
    pub async fn destroy(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id).is_some();
        if removed {
            debug!("Session {} removed ({} live)", id, sessions.len());
        }
        removed
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

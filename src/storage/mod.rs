//! Storage layer for the memory bridge
//!
//! Defines the two narrow interfaces the bridge consumes (identity resolution
//! and the durable note store) and a libSQL implementation of both.

pub mod libsql;

use crate::error::Result;
use crate::types::{Caller, Note, NoteMetadata, WorkspaceId};
use async_trait::async_trait;

/// Resolves API keys to callers
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Look up the caller owning `api_key`; `None` when the key is unknown or revoked
    async fn validate(&self, api_key: &str) -> Result<Option<Caller>>;

    /// Get or create the caller's default workspace (idempotent)
    async fn ensure_default_workspace(&self, caller: &Caller) -> Result<WorkspaceId>;
}

/// Filter for [`NoteStore::query_by_owner`]
///
/// Results are always ordered newest first.
#[derive(Debug, Clone)]
pub struct NoteQuery {
    /// Case-insensitive substring the content must contain
    pub contains: Option<String>,

    /// Maximum number of notes to return
    pub limit: usize,
}

impl NoteQuery {
    /// Most recent notes, no content filter
    pub fn recent(limit: usize) -> Self {
        Self {
            contains: None,
            limit,
        }
    }

    /// Most recent notes whose content contains `needle`
    pub fn containing(needle: impl Into<String>, limit: usize) -> Self {
        Self {
            contains: Some(needle.into()),
            limit,
        }
    }
}

/// Durable note store; the source of truth for every note
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Persist one note and return it with its generated id and timestamps
    async fn create_note(
        &self,
        caller: &Caller,
        workspace: &WorkspaceId,
        content: &str,
        metadata: &NoteMetadata,
    ) -> Result<Note>;

    /// Notes owned by `caller`, newest first
    async fn query_by_owner(&self, caller: &Caller, query: NoteQuery) -> Result<Vec<Note>>;
}

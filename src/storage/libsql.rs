//! LibSQL storage backend implementation
//!
//! Provides persistent storage of users, hashed API keys, workspaces and
//! notes in a local libSQL database file. Implements both
//! [`IdentityResolver`] and [`NoteStore`].

use crate::error::{BridgeError, Result};
use crate::storage::{IdentityResolver, NoteQuery, NoteStore};
use crate::types::{Caller, Note, NoteId, NoteMetadata, WorkspaceId};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{params, Builder, Connection, Database, Row};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Name of the workspace every caller gets on first use
pub const DEFAULT_WORKSPACE: &str = "default";

const API_KEY_PREFIX: &str = "mb_";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE,
    name TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    key_hash TEXT PRIMARY KEY,
    user_uuid TEXT NOT NULL REFERENCES users(id),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS apps (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE (owner_id, name)
);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    app_id TEXT NOT NULL REFERENCES apps(id),
    content TEXT NOT NULL,
    content_folded TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_owner_created
    ON memories (user_id, created_at DESC);
"#;

/// A provisioned user with its note count
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub caller: Caller,
    pub user_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub memory_count: u64,
}

/// LibSQL storage backend
pub struct LibsqlStore {
    db: Database,
}

impl LibsqlStore {
    /// Open (creating if needed) the database at `path` and apply the schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening libSQL database: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BridgeError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BridgeError::Database(format!("Failed to open local database: {}", e)))?;

        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.query("PRAGMA journal_mode = WAL", ()).await?;
        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| BridgeError::Database(format!("Failed to apply schema: {}", e)))?;
        debug!("Database schema ready");
        Ok(())
    }

    async fn get_conn(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| BridgeError::Database(format!("Failed to get connection: {}", e)))?;
        // Concurrent POSTs write through separate connections
        conn.query("PRAGMA busy_timeout = 5000", ()).await?;
        Ok(conn)
    }

    /// Provision a user with a fresh API key and default workspace
    ///
    /// Returns the caller and the plaintext key. Only the key's hash is
    /// stored, so the plaintext cannot be recovered later.
    pub async fn create_user(&self, user_id: &str, name: Option<&str>) -> Result<(Caller, String)> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(BridgeError::Validation("user_id cannot be empty".to_string()));
        }

        let conn = self.get_conn().await?;
        let mut existing = conn
            .query("SELECT id FROM users WHERE user_id = ?", params![user_id])
            .await?;
        if existing.next().await?.is_some() {
            return Err(BridgeError::Validation(format!(
                "User '{}' already exists",
                user_id
            )));
        }

        let caller = Caller {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
        };
        let api_key = generate_api_key();
        let now = timestamp(Utc::now());

        let tx = conn.transaction().await?;
        tx.execute(
            "INSERT INTO users (id, user_id, name, created_at) VALUES (?, ?, ?, ?)",
            params![
                caller.id.to_string(),
                caller.user_id.clone(),
                name.unwrap_or(user_id).to_string(),
                now.clone()
            ],
        )
        .await?;
        tx.execute(
            "INSERT INTO api_keys (key_hash, user_uuid, is_active, created_at) VALUES (?, ?, 1, ?)",
            params![hash_api_key(&api_key), caller.id.to_string(), now],
        )
        .await?;
        tx.commit().await?;

        self.ensure_default_workspace(&caller).await?;

        info!("Created user {} ({})", caller.user_id, caller.id);
        Ok((caller, api_key))
    }

    /// All users, oldest first, with the number of notes each owns
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT u.id, u.user_id, u.name, u.created_at, COUNT(m.id) \
                 FROM users u LEFT JOIN memories m ON m.user_id = u.id \
                 GROUP BY u.id ORDER BY u.created_at, u.user_id",
                (),
            )
            .await?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let user_id: String = row.get(1)?;
            let name: Option<String> = row.get(2)?;
            let created_at: String = row.get(3)?;
            let memory_count: i64 = row.get(4)?;

            users.push(UserSummary {
                caller: Caller {
                    id: parse_uuid(&id)?,
                    user_id: user_id.clone(),
                },
                user_id,
                name,
                created_at: parse_timestamp(&created_at)?,
                memory_count: memory_count.max(0) as u64,
            });
        }
        Ok(users)
    }

    fn row_to_note(row: &Row) -> Result<Note> {
        let id: String = row.get(0)?;
        let owner: String = row.get(1)?;
        let workspace: String = row.get(2)?;
        let content: String = row.get(3)?;
        let metadata: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;

        let metadata = serde_json::from_str::<serde_json::Value>(&metadata)
            .map(|value| NoteMetadata::from_value(&value))
            .unwrap_or_default();

        Ok(Note {
            id: NoteId(parse_uuid(&id)?),
            owner: parse_uuid(&owner)?,
            workspace: WorkspaceId(parse_uuid(&workspace)?),
            content,
            metadata,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

#[async_trait]
impl IdentityResolver for LibsqlStore {
    async fn validate(&self, api_key: &str) -> Result<Option<Caller>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT u.id, u.user_id FROM api_keys k \
                 JOIN users u ON u.id = k.user_uuid \
                 WHERE k.key_hash = ? AND k.is_active = 1",
                params![hash_api_key(api_key)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let id: String = row.get(0)?;
                let user_id: String = row.get(1)?;
                Ok(Some(Caller {
                    id: parse_uuid(&id)?,
                    user_id,
                }))
            }
            None => Ok(None),
        }
    }

    async fn ensure_default_workspace(&self, caller: &Caller) -> Result<WorkspaceId> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR IGNORE INTO apps (id, owner_id, name, is_active, created_at) \
             VALUES (?, ?, ?, 1, ?)",
            params![
                Uuid::new_v4().to_string(),
                caller.id.to_string(),
                DEFAULT_WORKSPACE,
                timestamp(Utc::now())
            ],
        )
        .await?;

        let mut rows = conn
            .query(
                "SELECT id FROM apps WHERE owner_id = ? AND name = ?",
                params![caller.id.to_string(), DEFAULT_WORKSPACE],
            )
            .await?;

        let row = rows.next().await?.ok_or_else(|| {
            BridgeError::Database(format!("Default workspace missing for {}", caller.user_id))
        })?;
        let id: String = row.get(0)?;
        Ok(WorkspaceId(parse_uuid(&id)?))
    }
}

#[async_trait]
impl NoteStore for LibsqlStore {
    async fn create_note(
        &self,
        caller: &Caller,
        workspace: &WorkspaceId,
        content: &str,
        metadata: &NoteMetadata,
    ) -> Result<Note> {
        let now = Utc::now();
        let note = Note {
            id: NoteId::new(),
            owner: caller.id,
            workspace: *workspace,
            content: content.to_string(),
            metadata: metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        debug!("Storing note {} for {}", note.id, caller.user_id);

        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO memories \
             (id, user_id, app_id, content, content_folded, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                note.id.to_string(),
                note.owner.to_string(),
                note.workspace.to_string(),
                note.content.clone(),
                fold_case(&note.content),
                serde_json::to_string(&note.metadata.to_map())?,
                timestamp(note.created_at),
                timestamp(note.updated_at)
            ],
        )
        .await?;

        Ok(note)
    }

    async fn query_by_owner(&self, caller: &Caller, query: NoteQuery) -> Result<Vec<Note>> {
        debug!(
            "Querying notes for {} (contains: {:?}, limit: {})",
            caller.user_id, query.contains, query.limit
        );

        let conn = self.get_conn().await?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let mut rows = match query.contains {
            Some(needle) => {
                conn.query(
                    "SELECT id, user_id, app_id, content, metadata, created_at, updated_at \
                     FROM memories WHERE user_id = ? AND content_folded LIKE ? ESCAPE '\\' \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?",
                    params![
                        caller.id.to_string(),
                        format!("%{}%", escape_like(&fold_case(&needle))),
                        limit
                    ],
                )
                .await?
            }
            None => {
                conn.query(
                    "SELECT id, user_id, app_id, content, metadata, created_at, updated_at \
                     FROM memories WHERE user_id = ? \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?",
                    params![caller.id.to_string(), limit],
                )
                .await?
            }
        };

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(Self::row_to_note(&row)?);
        }

        debug!("Found {} notes", notes.len());
        Ok(notes)
    }
}

/// SHA-256 hex digest of an API key
pub fn hash_api_key(api_key: &str) -> String {
    format!("{:x}", Sha256::digest(api_key.as_bytes()))
}

fn generate_api_key() -> String {
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("{}{}", API_KEY_PREFIX, secret)
}

// Fixed-width UTC timestamps sort correctly as text
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BridgeError::Database(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| BridgeError::Database(format!("Invalid id '{}': {}", raw, e)))
}

// SQLite's LIKE only folds ASCII, so both sides are lowercased up front
fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

//! Core data types for the memory bridge
//!
//! Defines the caller identity resolved from an API key, the notes the tools
//! store and return, and the metadata bag attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// Unique identifier for notes
///
/// Wraps a UUID so note ids cannot be confused with user or workspace ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub Uuid);

impl NoteId {
    /// Create a new random note ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a note ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workspace ("app") a note is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub Uuid);

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated caller, as produced by API key validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Primary key used for record ownership
    pub id: Uuid,

    /// Human-facing user name, also the key used by the search backend
    pub user_id: String,
}

/// Owning identity of a session or a direct RPC call
///
/// Resolved once when a stream opens: the caller plus its default workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub caller: Caller,
    pub workspace: WorkspaceId,
}

/// Metadata attached to a note
///
/// The bag is opaque to the bridge: the original JSON object is kept as-is
/// and round-tripped to the store and the search backend. The three
/// recognized keys are additionally decoded into display fields, so a value
/// of an unexpected shape is still stored but not echoed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct NoteMetadata {
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<String>,
    raw: Map<String, Value>,
}

impl NoteMetadata {
    /// Decode metadata from a tool argument or a stored column
    ///
    /// Accepts an object or a JSON-encoded string holding an object. Anything
    /// else, including a string that fails to decode, yields empty metadata.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map.clone()),
            Value::String(raw) if raw.trim().is_empty() => Self::default(),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Self::from_map(map),
                Ok(_) => {
                    warn!("Metadata string is not a JSON object, ignoring: {}", raw);
                    Self::default()
                }
                Err(e) => {
                    warn!("Failed to parse metadata string {:?}: {}", raw, e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    fn from_map(raw: Map<String, Value>) -> Self {
        Self {
            category: raw.get("category").and_then(scalar_string),
            tags: raw.get("tags").and_then(tag_list),
            priority: raw.get("priority").and_then(scalar_string),
            raw,
        }
    }

    /// True when nothing at all was supplied
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The metadata object exactly as supplied
    pub fn to_map(&self) -> Map<String, Value> {
        self.raw.clone()
    }

    /// Human-readable labels for the recognized keys, in display order
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if let Some(category) = &self.category {
            labels.push(format!("Category: {}", category));
        }
        if let Some(tags) = &self.tags {
            labels.push(format!("Tags: {}", tags.join(", ")));
        }
        if let Some(priority) = &self.priority {
            labels.push(format!("Priority: {}", priority));
        }
        labels
    }

    /// Inline annotation appended to a result line, e.g. ` [Category: todo | Priority: high]`
    pub fn annotation(&self) -> String {
        let labels = self.labels();
        if labels.is_empty() {
            String::new()
        } else {
            format!(" [{}]", labels.join(" | "))
        }
    }
}

impl From<Map<String, Value>> for NoteMetadata {
    fn from(raw: Map<String, Value>) -> Self {
        Self::from_map(raw)
    }
}

impl From<NoteMetadata> for Map<String, Value> {
    fn from(metadata: NoteMetadata) -> Self {
        metadata.raw
    }
}

// Display-only normalization; the raw value is never rewritten
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tag_list(value: &Value) -> Option<Vec<String>> {
    let tags: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// A stored note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub owner: Uuid,
    pub workspace: WorkspaceId,
    pub content: String,
    pub metadata: NoteMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ranked result from the search backend
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub content: String,
    pub score: f32,
    pub metadata: NoteMetadata,
}

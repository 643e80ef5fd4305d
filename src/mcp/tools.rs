//! MCP tool implementations
//!
//! Provides the three note tools:
//! - `add_memory`: store a note with optional metadata
//! - `search_memories`: semantic search with a substring fallback
//! - `list_memories`: most recent notes
//!
//! Every tool returns plain text meant to be read by the calling agent.

use crate::error::Result;
use crate::services::SearchBackend;
use crate::storage::{NoteQuery, NoteStore};
use crate::types::{Identity, Note, NoteMetadata, SearchHit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_SEARCH_LIMIT: usize = 5;
const DEFAULT_LIST_LIMIT: usize = 10;

/// Tool schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name (e.g., "add_memory")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,
}

/// Known tool names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    AddMemory,
    SearchMemories,
    ListMemories,
}

impl ToolName {
    /// Resolve a `tools/call` name; `None` for anything unknown
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "add_memory" => Some(ToolName::AddMemory),
            "search_memories" => Some(ToolName::SearchMemories),
            "list_memories" => Some(ToolName::ListMemories),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::AddMemory => "add_memory",
            ToolName::SearchMemories => "search_memories",
            ToolName::ListMemories => "list_memories",
        }
    }
}

/// Tool handler that dispatches to appropriate implementation
pub struct ToolHandler {
    store: Arc<dyn NoteStore>,
    search: Option<Arc<dyn SearchBackend>>,
}

impl ToolHandler {
    /// Create a new tool handler; `search` may be absent
    pub fn new(store: Arc<dyn NoteStore>, search: Option<Arc<dyn SearchBackend>>) -> Self {
        Self { store, search }
    }

    /// Get list of all available tools
    ///
    /// Must be kept in sync with [`ToolName`] and [`ToolHandler::call`].
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: ToolName::AddMemory.as_str().to_string(),
                description: "Store a memory to maintain continuity across conversations."
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "What you want to remember"
                        },
                        "metadata": {
                            "type": "object",
                            "description": "Optional metadata to organize memories",
                            "properties": {
                                "category": {
                                    "type": "string",
                                    "description": "Primary category to organize this memory"
                                },
                                "tags": {
                                    "type": "array",
                                    "description": "Tags for flexible organization",
                                    "items": {"type": "string"}
                                },
                                "priority": {
                                    "type": "string",
                                    "description": "Priority level for this memory"
                                }
                            }
                        }
                    },
                    "required": ["text"]
                }),
            },
            Tool {
                name: ToolName::SearchMemories.as_str().to_string(),
                description: "Search through stored memories using a query".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of results to return",
                            "default": DEFAULT_SEARCH_LIMIT
                        }
                    },
                    "required": ["query"]
                }),
            },
            Tool {
                name: ToolName::ListMemories.as_str().to_string(),
                description: "List all memories for the authenticated user".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of memories to return",
                            "default": DEFAULT_LIST_LIMIT
                        }
                    }
                }),
            },
        ]
    }

    /// Execute a tool call
    ///
    /// Argument problems are reported as `Ok` text starting with `Error:`;
    /// `Err` means a collaborator failed.
    pub async fn call(&self, tool: ToolName, identity: &Identity, args: &Value) -> Result<String> {
        debug!("Executing tool: {}", tool.as_str());

        match tool {
            ToolName::AddMemory => self.add_memory(identity, args).await,
            ToolName::SearchMemories => self.search_memories(identity, args).await,
            ToolName::ListMemories => self.list_memories(identity, args).await,
        }
    }

    async fn add_memory(&self, identity: &Identity, args: &Value) -> Result<String> {
        let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
        if text.is_empty() {
            return Ok("Error: 'text' parameter is required".to_string());
        }

        let metadata = args
            .get("metadata")
            .map(NoteMetadata::from_value)
            .unwrap_or_default();

        let note = self
            .store
            .create_note(&identity.caller, &identity.workspace, text, &metadata)
            .await?;
        info!("Stored note {} for {}", note.id, identity.caller.user_id);

        if let Some(search) = &self.search {
            let mut index_metadata = metadata.to_map();
            index_metadata.insert(
                "app_id".to_string(),
                Value::String(identity.workspace.to_string()),
            );

            // The store write already succeeded; indexing is best effort
            if let Err(e) = search
                .index(&identity.caller, text, &index_metadata)
                .await
            {
                warn!("Failed to add note {} to search backend: {}", note.id, e);
            }
        }

        let mut response = format!("Memory stored successfully. ID: {}", note.id);
        for label in metadata.labels() {
            response.push('\n');
            response.push_str(&label);
        }
        Ok(response)
    }

    async fn search_memories(&self, identity: &Identity, args: &Value) -> Result<String> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
        if query.is_empty() {
            return Ok("Error: 'query' parameter is required".to_string());
        }
        let limit = limit_arg(args, DEFAULT_SEARCH_LIMIT);

        if let Some(search) = &self.search {
            match search.query(&identity.caller, query, limit).await {
                Ok(hits) if !hits.is_empty() => return Ok(format_hits(&hits)),
                Ok(_) => debug!("Search backend returned no results, using store fallback"),
                Err(e) => warn!("Search backend failed, using store fallback: {}", e),
            }
        }

        let notes = self
            .store
            .query_by_owner(&identity.caller, NoteQuery::containing(query, limit))
            .await?;

        if notes.is_empty() {
            return Ok("No memories found matching your query.".to_string());
        }

        let lines: Vec<String> = notes
            .iter()
            .enumerate()
            .map(|(i, note)| format!("{}. {}{}", i + 1, note.content, note.metadata.annotation()))
            .collect();
        Ok(format!("Found {} memories:\n{}", notes.len(), lines.join("\n")))
    }

    async fn list_memories(&self, identity: &Identity, args: &Value) -> Result<String> {
        let limit = limit_arg(args, DEFAULT_LIST_LIMIT);

        let notes = self
            .store
            .query_by_owner(&identity.caller, NoteQuery::recent(limit))
            .await?;

        if notes.is_empty() {
            return Ok("You have no stored memories yet.".to_string());
        }

        Ok(format!(
            "Your {} most recent memories:\n{}",
            notes.len(),
            notes
                .iter()
                .enumerate()
                .map(|(i, note)| format_listed(i + 1, note))
                .collect::<Vec<_>>()
                .join("\n")
        ))
    }
}

fn format_hits(hits: &[SearchHit]) -> String {
    let lines: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{}. {} (relevance: {:.2}){}",
                i + 1,
                hit.content,
                hit.score,
                hit.metadata.annotation()
            )
        })
        .collect();
    format!("Found {} memories:\n{}", hits.len(), lines.join("\n"))
}

fn format_listed(position: usize, note: &Note) -> String {
    format!(
        "{}. [{}] {}{}",
        position,
        note.created_at.format("%Y-%m-%d %H:%M:%S"),
        note.content,
        note.metadata.annotation()
    )
}

/// Read a `limit` argument, accepting integers and integer strings
fn limit_arg(args: &Value, default: usize) -> usize {
    let limit = match args.get("limit") {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        Some(Value::String(s)) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    limit.unwrap_or(default).max(1)
}

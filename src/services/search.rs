//! Semantic search backend client
//!
//! The search backend is an optional accelerator: notes are always written
//! to the durable store first, and searches fall back to a substring match
//! over the store whenever the backend is absent or failing.

use crate::config::SearchConfig;
use crate::error::{BridgeError, Result};
use crate::types::{Caller, NoteMetadata, SearchHit};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Similarity search over a caller's notes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Mirror one note into the index
    async fn index(&self, caller: &Caller, content: &str, metadata: &Map<String, Value>)
        -> Result<()>;

    /// Ranked matches for `text`, best first
    async fn query(&self, caller: &Caller, text: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// HTTP client for a mem0-style memory service
pub struct HttpSearchBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct IndexRequest<'a> {
    messages: Vec<Message<'a>>,
    user_id: &'a str,
    metadata: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    user_id: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { results: Vec<RawHit> },
    Bare(Vec<RawHit>),
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(default)]
    memory: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Value,
}

impl From<RawHit> for SearchHit {
    fn from(raw: RawHit) -> Self {
        SearchHit {
            content: raw.memory.or(raw.content).unwrap_or_default(),
            score: raw.score.unwrap_or(0.0),
            metadata: NoteMetadata::from_value(&raw.metadata),
        }
    }
}

impl HttpSearchBackend {
    /// Create a client for the service described by `config`
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn index(
        &self,
        caller: &Caller,
        content: &str,
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        let request = IndexRequest {
            messages: vec![Message {
                role: "user",
                content,
            }],
            user_id: &caller.user_id,
            metadata,
        };

        let response = self.post("/v1/memories/").json(&request).send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::Search(format!(
                "index request failed with status {}",
                response.status()
            )));
        }

        debug!("Indexed note for {}", caller.user_id);
        Ok(())
    }

    async fn query(&self, caller: &Caller, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let request = SearchRequest {
            query: text,
            user_id: &caller.user_id,
            limit,
        };

        let response = self.post("/v1/memories/search/").json(&request).send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::Search(format!(
                "search request failed with status {}",
                response.status()
            )));
        }

        let hits = match response.json::<SearchResponse>().await? {
            SearchResponse::Wrapped { results } => results,
            SearchResponse::Bare(results) => results,
        };

        Ok(hits.into_iter().map(SearchHit::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrapped_response_decoding() {
        let body = json!({
            "results": [
                {"memory": "buy milk", "score": 0.91, "metadata": {"category": "todo"}},
                {"content": "call mom"}
            ]
        });

        let response: SearchResponse = serde_json::from_value(body).unwrap();
        let hits: Vec<SearchHit> = match response {
            SearchResponse::Wrapped { results } => results.into_iter().map(Into::into).collect(),
            SearchResponse::Bare(_) => panic!("expected wrapped response"),
        };

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "buy milk");
        assert!((hits[0].score - 0.91).abs() < f32::EPSILON);
        assert_eq!(hits[0].metadata.category.as_deref(), Some("todo"));
        assert_eq!(hits[1].content, "call mom");
        assert_eq!(hits[1].score, 0.0);
        assert!(hits[1].metadata.is_empty());
    }

    #[test]
    fn test_bare_response_decoding() {
        let body = json!([{"memory": "water plants", "score": 0.5}]);
        let response: SearchResponse = serde_json::from_value(body).unwrap();
        assert!(matches!(response, SearchResponse::Bare(ref hits) if hits.len() == 1));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let backend = HttpSearchBackend::new(&SearchConfig::new("http://localhost:8000/")).unwrap();
        assert_eq!(backend.base_url, "http://localhost:8000");
    }
}

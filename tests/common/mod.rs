//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, BodyDataStream},
    http::{Request, Response, StatusCode},
    Router,
};
use memory_bridge::{
    api::{self, AppState},
    config::ServerConfig,
    mcp::{RpcDispatcher, ToolHandler},
    services::SearchBackend,
    storage::libsql::LibsqlStore,
    BridgeError, Caller, SearchHit,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// How long a test waits for any single stream frame
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// A bridge wired to a temporary database, driven in-process
pub struct TestBridge {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<LibsqlStore>,
    pub api_key: String,
    pub shutdown: CancellationToken,
    _temp_dir: TempDir,
}

impl TestBridge {
    pub async fn new(search: Option<Arc<dyn SearchBackend>>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            LibsqlStore::open(temp_dir.path().join("bridge.db"))
                .await
                .expect("Failed to open test store"),
        );
        let (_caller, api_key) = store
            .create_user("alice", Some("Alice"))
            .await
            .expect("Failed to create test user");

        let config = ServerConfig {
            cleanup_grace: Duration::from_millis(50),
            ..ServerConfig::default()
        };
        let shutdown = CancellationToken::new();
        let dispatcher = Arc::new(RpcDispatcher::new(ToolHandler::new(store.clone(), search)));
        let state = AppState::new(&config, dispatcher, store.clone(), shutdown.clone());

        Self {
            router: api::router(state.clone()),
            state,
            store,
            api_key,
            shutdown,
            _temp_dir: temp_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible")
    }

    /// Open a stream with `?key=` and return its reader
    pub async fn open_stream(&self, client: &str) -> SseReader {
        let response = self
            .send(get(&format!("/mcp/{}/sse?key={}", client, self.api_key)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        SseReader::new(response)
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = self.send(post(uri, body)).await;
        let status = response.status();
        (status, body_json(response).await)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

pub fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// One parsed server-sent event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub comment: Option<String>,
}

impl SseFrame {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).expect("Frame data is not JSON")
    }
}

/// Incremental reader over an event-stream response body
pub struct SseReader {
    body: BodyDataStream,
    buffer: String,
}

impl SseReader {
    pub fn new(response: Response<Body>) -> Self {
        Self {
            body: response.into_body().into_data_stream(),
            buffer: String::new(),
        }
    }

    /// Next complete frame, or `None` once the stream has ended
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..end + 2).collect();
                return Some(parse_frame(&raw));
            }

            let chunk = tokio::time::timeout(FRAME_TIMEOUT, self.body.next())
                .await
                .expect("Timed out waiting for a stream frame")?
                .expect("Stream body failed");
            self.buffer.push_str(std::str::from_utf8(&chunk).expect("utf-8 frame"));
        }
    }

    /// Next frame that is not a keep-alive comment
    pub async fn next_event(&mut self) -> SseFrame {
        loop {
            let frame = self.next_frame().await.expect("Stream ended unexpectedly");
            if frame.comment.is_none() || !frame.data.is_empty() {
                return frame;
            }
        }
    }
}

fn parse_frame(raw: &str) -> SseFrame {
    let mut frame = SseFrame::default();
    let mut data = Vec::new();

    for line in raw.lines().filter(|l| !l.is_empty()) {
        if let Some(comment) = line.strip_prefix(':') {
            frame.comment = Some(comment.trim().to_string());
        } else if let Some((field, value)) = line.split_once(':') {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => frame.event = Some(value.to_string()),
                "data" => data.push(value.to_string()),
                _ => {}
            }
        }
    }

    frame.data = data.join("\n");
    frame
}

/// Search backend that is always down
pub struct UnreachableSearch;

#[async_trait]
impl SearchBackend for UnreachableSearch {
    async fn index(
        &self,
        _caller: &Caller,
        _content: &str,
        _metadata: &Map<String, Value>,
    ) -> memory_bridge::Result<()> {
        Err(BridgeError::Search("connection refused".to_string()))
    }

    async fn query(
        &self,
        _caller: &Caller,
        _text: &str,
        _limit: usize,
    ) -> memory_bridge::Result<Vec<SearchHit>> {
        Err(BridgeError::Search("connection refused".to_string()))
    }
}

/// Search backend whose indexing takes longer than a client will wait
pub struct SlowIndexSearch(pub Duration);

#[async_trait]
impl SearchBackend for SlowIndexSearch {
    async fn index(
        &self,
        _caller: &Caller,
        _content: &str,
        _metadata: &Map<String, Value>,
    ) -> memory_bridge::Result<()> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }

    async fn query(
        &self,
        _caller: &Caller,
        _text: &str,
        _limit: usize,
    ) -> memory_bridge::Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// Search backend that panics on every query
pub struct PanickingSearch;

#[async_trait]
impl SearchBackend for PanickingSearch {
    async fn index(
        &self,
        _caller: &Caller,
        _content: &str,
        _metadata: &Map<String, Value>,
    ) -> memory_bridge::Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        _caller: &Caller,
        _text: &str,
        _limit: usize,
    ) -> memory_bridge::Result<Vec<SearchHit>> {
        panic!("search index corrupted")
    }
}

/// JSON-RPC `tools/call` request body
pub fn tool_call(id: i64, name: &str, arguments: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
    .to_string()
}

/// Text of the first content item in a tool result envelope
pub fn tool_text(envelope: &Value) -> String {
    envelope["result"]["content"][0]["text"]
        .as_str()
        .expect("tool result has text content")
        .to_string()
}

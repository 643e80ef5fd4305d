//! HTTP API server with SSE support

use super::sessions::{SessionId, SessionRegistry};
use super::stream::StreamTransport;
use crate::config::ServerConfig;
use crate::error::{BridgeError, Result};
use crate::mcp::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcDispatcher};
use crate::storage::IdentityResolver;
use crate::types::Identity;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    transport: StreamTransport,
    dispatcher: Arc<RpcDispatcher>,
    identities: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        dispatcher: Arc<RpcDispatcher>,
        identities: Arc<dyn IdentityResolver>,
        shutdown: CancellationToken,
    ) -> Self {
        let transport = StreamTransport::new(
            SessionRegistry::new(),
            config.keepalive,
            config.cleanup_grace,
            shutdown,
        );
        Self {
            transport,
            dispatcher,
            identities,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        self.transport.registry()
    }

    /// Resolve an API key into the identity a session or call runs as
    async fn authenticate(&self, api_key: Option<String>) -> Result<Identity> {
        let api_key = api_key
            .ok_or_else(|| BridgeError::InvalidCredential("API key required".to_string()))?;

        let caller = self
            .identities
            .validate(&api_key)
            .await?
            .ok_or_else(|| BridgeError::InvalidCredential("Invalid API key".to_string()))?;

        let workspace = self.identities.ensure_default_workspace(&caller).await?;
        Ok(Identity { caller, workspace })
    }
}

/// Build the bridge router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp/:client/sse", get(sse_handler))
        .route("/mcp/:client/messages/:session_id", post(messages_handler))
        .route("/mcp/:client/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C, then cancel every open stream
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Memory bridge listening on http://{}", listener.local_addr()?);

    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested, closing streams");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        })
        .await?;

    info!("Memory bridge stopped");
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// API key for a stream: `?key=`, then `Authorization: Bearer`, then `X-API-Key`
fn stream_api_key(query: KeyQuery, headers: &HeaderMap) -> Option<String> {
    query
        .key
        .filter(|k| !k.is_empty())
        .or_else(|| {
            header_str(headers, header::AUTHORIZATION)
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|v| v.trim().to_string())
        })
        .or_else(|| header_str(headers, X_API_KEY).map(str::to_string))
}

/// Open an event stream for the caller
async fn sse_handler(
    State(state): State<AppState>,
    Path(client): Path<String>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let identity = state.authenticate(stream_api_key(query, &headers)).await?;
    debug!("Stream requested by {} via {}", identity.caller.user_id, client);

    let sse = state.transport.open(identity, &client).await;
    Ok(([(X_ACCEL_BUFFERING, HeaderValue::from_static("no"))], sse).into_response())
}

/// Accept one JSON-RPC message for a session; the reply goes out on the stream
async fn messages_handler(
    State(state): State<AppState>,
    Path((client, session_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let session = match state.sessions().get(&SessionId::from(session_id.as_str())).await {
        Ok(session) => session,
        Err(_) => {
            warn!("Invalid session: {}", session_id);
            return Json(JsonRpcResponse::error(None, JsonRpcError::invalid_session()))
                .into_response();
        }
    };

    let dispatcher = state.dispatcher.clone();
    let label = format!("{}/{}", client, session_id);

    // Detached so the reply is still queued if the POST is dropped mid-call
    let relay = tokio::spawn(async move {
        let response = match JsonRpcRequest::from_slice(&body) {
            Ok(request) => {
                info!("Received {} (id: {:?}) on {}", request.method, request.id, label);
                let id = request.id.clone();
                let identity = session.identity.clone();

                // Isolated so a panicking call still yields a reply
                let call =
                    tokio::spawn(async move { dispatcher.dispatch(request, &identity).await });
                match call.await {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Dispatch task failed on {}: {}", label, e);
                        JsonRpcResponse::error(
                            id,
                            JsonRpcError::internal_error("Internal error").with_data(e.to_string()),
                        )
                    }
                }
            }
            Err(malformed) => {
                warn!("Malformed message on {}: {}", label, malformed.reason);
                JsonRpcResponse::error(
                    malformed.id,
                    JsonRpcError::internal_error("Internal error").with_data(malformed.reason),
                )
            }
        };

        if let Err(e) = session.enqueue(response) {
            debug!("Dropped response for closed stream: {}", e);
        }
    });

    if let Err(e) = relay.await {
        error!("Relay task failed on session {}: {}", session_id, e);
    }

    Json(json!({ "ok": true })).into_response()
}

/// Synchronous JSON-RPC call without a stream
async fn rpc_handler(
    State(state): State<AppState>,
    Path(client): Path<String>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<JsonRpcResponse> {
    let api_key = query
        .key
        .filter(|k| !k.is_empty())
        .or_else(|| header_str(&headers, X_API_KEY).map(str::to_string));

    let identity = match state.authenticate(api_key).await {
        Ok(identity) => identity,
        Err(BridgeError::InvalidCredential(message)) => {
            return Json(JsonRpcResponse::error(None, JsonRpcError::parse_error(message)));
        }
        Err(e) => {
            error!("Failed to resolve caller: {}", e);
            return Json(JsonRpcResponse::error(
                None,
                JsonRpcError::internal_error("Internal error").with_data(e.to_string()),
            ));
        }
    };

    let request = match JsonRpcRequest::from_slice(&body) {
        Ok(request) => request,
        Err(malformed) => {
            return Json(JsonRpcResponse::error(
                None,
                JsonRpcError::parse_error("Parse error").with_data(malformed.reason),
            ));
        }
    };

    debug!("Direct {} call from {} via {}", request.method, identity.caller.user_id, client);
    Json(state.dispatcher.dispatch(request, &identity).await)
}

/// Health check handler
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.sessions().len().await,
    })
}

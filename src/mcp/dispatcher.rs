//! JSON-RPC method dispatch
//!
//! Maps one decoded request plus the owning identity to exactly one
//! response. Transport concerns (sessions, streams, HTTP) live in `api`.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::tools::{ToolHandler, ToolName};
use crate::types::Identity;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// MCP protocol revision announced by `initialize`
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Routes JSON-RPC methods to handlers
pub struct RpcDispatcher {
    tools: ToolHandler,
}

impl RpcDispatcher {
    pub fn new(tools: ToolHandler) -> Self {
        Self { tools }
    }

    /// Handle a single request on behalf of `identity`
    ///
    /// Never fails: every outcome, including tool errors, is expressed as a
    /// response envelope. Notifications get a reply as well.
    pub async fn dispatch(&self, request: JsonRpcRequest, identity: &Identity) -> JsonRpcResponse {
        debug!(
            "Dispatching {} for {}",
            request.method, identity.caller.user_id
        );

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request, identity).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
        }
    }

    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            request.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(request.id, json!({ "tools": self.tools.list_tools() }))
    }

    async fn handle_tools_call(&self, request: JsonRpcRequest, identity: &Identity) -> JsonRpcResponse {
        let name = request
            .params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let Some(tool) = ToolName::parse(name) else {
            return JsonRpcResponse::error(request.id, JsonRpcError::unknown_tool(name));
        };

        let arguments = match request.params.get("arguments") {
            Some(Value::Null) | None => json!({}),
            Some(args) => args.clone(),
        };

        let text = match self.tools.call(tool, identity, &arguments).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Tool {} failed: {}", tool.as_str(), e);
                format!("Error: {}", e)
            }
        };

        JsonRpcResponse::success(
            request.id,
            json!({
                "content": [
                    {
                        "type": "text",
                        "text": text
                    }
                ]
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::services::search::MockSearchBackend;
    use crate::storage::libsql::LibsqlStore;
    use crate::storage::IdentityResolver;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_dispatcher(
        search: Option<MockSearchBackend>,
    ) -> (RpcDispatcher, Identity, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            LibsqlStore::open(temp_dir.path().join("dispatch.db"))
                .await
                .unwrap(),
        );
        let (caller, _key) = store.create_user("dispatcher", None).await.unwrap();
        let workspace = store.ensure_default_workspace(&caller).await.unwrap();

        let search = search.map(|s| Arc::new(s) as Arc<dyn crate::services::SearchBackend>);
        let dispatcher = RpcDispatcher::new(ToolHandler::new(store, search));
        (dispatcher, Identity { caller, workspace }, temp_dir)
    }

    fn request(id: Value, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(id),
        }
    }

    #[tokio::test]
    async fn test_initialize() {
        let (dispatcher, identity, _temp) = create_dispatcher(None).await;

        let response = dispatcher
            .dispatch(request(json!(1), "initialize", json!({})), &identity)
            .await;

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-06-18");
        assert_eq!(result["capabilities"], json!({"tools": {}}));
        assert_eq!(result["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(response.id, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (dispatcher, identity, _temp) = create_dispatcher(None).await;

        let response = dispatcher
            .dispatch(request(json!("a"), "tools/list", Value::Null), &identity)
            .await;

        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec!["add_memory", "search_memories", "list_memories"]);
        assert_eq!(response.id, Some(json!("a")));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (dispatcher, identity, _temp) = create_dispatcher(None).await;

        let response = dispatcher
            .dispatch(request(json!(9), "resources/list", json!({})), &identity)
            .await;

        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::METHOD_NOT_FOUND);
        assert_eq!(error.message, "Method not found: resources/list");
        assert!(response.result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_or_missing_tool() {
        let (dispatcher, identity, _temp) = create_dispatcher(None).await;

        let response = dispatcher
            .dispatch(
                request(json!(2), "tools/call", json!({"name": "delete_memory"})),
                &identity,
            )
            .await;
        assert_eq!(response.error, Some(JsonRpcError::unknown_tool("delete_memory")));

        let response = dispatcher
            .dispatch(request(json!(3), "tools/call", json!({})), &identity)
            .await;
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tool_call_without_arguments() {
        let (dispatcher, identity, _temp) = create_dispatcher(None).await;

        let response = dispatcher
            .dispatch(
                request(json!(4), "tools/call", json!({"name": "list_memories"})),
                &identity,
            )
            .await;

        let result = response.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "You have no stored memories yet.");
    }

    #[tokio::test]
    async fn test_validation_error_is_a_result() {
        let (dispatcher, identity, _temp) = create_dispatcher(None).await;

        let response = dispatcher
            .dispatch(
                request(
                    json!(5),
                    "tools/call",
                    json!({"name": "add_memory", "arguments": {"text": ""}}),
                ),
                &identity,
            )
            .await;

        assert!(response.error.is_none());
        assert_eq!(
            response.result.unwrap()["content"][0]["text"],
            "Error: 'text' parameter is required"
        );
    }

    #[tokio::test]
    async fn test_notification_still_answered() {
        let (dispatcher, identity, _temp) = create_dispatcher(None).await;

        let response = dispatcher
            .dispatch(
                JsonRpcRequest {
                    jsonrpc: "2.0".to_string(),
                    method: "notifications/initialized".to_string(),
                    params: Value::Null,
                    id: None,
                },
                &identity,
            )
            .await;

        assert_eq!(response.id, None);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_search_fallback_through_dispatch() {
        let mut search = MockSearchBackend::new();
        search.expect_index().returning(|_, _, _| Ok(()));
        search
            .expect_query()
            .returning(|_, _, _| Err(BridgeError::Search("unreachable".into())));

        let (dispatcher, identity, _temp) = create_dispatcher(Some(search)).await;

        dispatcher
            .dispatch(
                request(
                    json!(6),
                    "tools/call",
                    json!({"name": "add_memory", "arguments": {"text": "buy oat milk"}}),
                ),
                &identity,
            )
            .await;

        let response = dispatcher
            .dispatch(
                request(
                    json!(7),
                    "tools/call",
                    json!({"name": "search_memories", "arguments": {"query": "milk"}}),
                ),
                &identity,
            )
            .await;

        assert_eq!(
            response.result.unwrap()["content"][0]["text"],
            "Found 1 memories:\n1. buy oat milk"
        );
    }
}

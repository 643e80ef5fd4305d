//! JSON-RPC 2.0 protocol implementation
//!
//! Defines the envelope types exchanged with MCP clients and the decoding of
//! raw request bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version ("2.0"; not enforced)
    #[serde(default = "default_version")]
    pub jsonrpc: String,

    /// Method name to invoke
    #[serde(default)]
    pub method: String,

    /// Parameters (can be object or array)
    #[serde(default)]
    pub params: Value,

    /// Request ID (absent for notifications)
    #[serde(default)]
    pub id: Option<Value>,
}

fn default_version() -> String {
    "2.0".to_string()
}

/// A request body that could not be turned into a [`JsonRpcRequest`]
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRequest {
    /// Request id, when one could still be read from the body
    pub id: Option<Value>,

    /// Why decoding failed
    pub reason: String,
}

impl JsonRpcRequest {
    /// Decode a raw HTTP body
    ///
    /// On failure the request id is still recovered when the body is a JSON
    /// object carrying one, so the error reply can be correlated.
    pub fn from_slice(body: &[u8]) -> Result<Self, MalformedRequest> {
        let value: Value = serde_json::from_slice(body).map_err(|e| MalformedRequest {
            id: None,
            reason: e.to_string(),
        })?;

        if !value.is_object() {
            return Err(MalformedRequest {
                id: None,
                reason: "request must be a JSON object".to_string(),
            });
        }

        let id = value.get("id").cloned();
        serde_json::from_value(value).map_err(|e| MalformedRequest {
            id,
            reason: e.to_string(),
        })
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Result (present if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error (present if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request ID (echoed from request, `null` when absent)
    pub id: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,

    /// Error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Parse error (-32700)
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: Self::PARSE_ERROR,
            message: message.into(),
            data: None,
        }
    }

    /// Invalid request (-32600)
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_REQUEST,
            message: message.into(),
            data: None,
        }
    }

    /// Unknown session id (-32600)
    pub fn invalid_session() -> Self {
        Self::invalid_request("Invalid session")
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method.into()),
            data: None,
        }
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }

    /// Unknown tool name in `tools/call` (-32602)
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::invalid_params(format!("Unknown tool: {}", name.into()))
    }

    /// Internal error (-32603)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: Self::INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }

    /// Attach detail data
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/list".to_string(),
            params: json!({}),
            id: Some(json!(1)),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
    }

    #[test]
    fn test_response_serialization() {
        let response = JsonRpcResponse::success(Some(json!(1)), json!({"status": "ok"}));

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_error_response() {
        let response = JsonRpcResponse::error(
            Some(json!(1)),
            JsonRpcError::method_not_found("invalid_method"),
        );

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("-32601"));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_absent_id_serializes_as_null() {
        let response = JsonRpcResponse::error(None, JsonRpcError::invalid_session());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32600, "message": "Invalid session"}
            })
        );
    }

    #[test]
    fn test_from_slice_notification() {
        let request =
            JsonRpcRequest::from_slice(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert_eq!(request.method, "notifications/initialized");
        assert_eq!(request.id, None);
        assert_eq!(request.params, Value::Null);
    }

    #[test]
    fn test_from_slice_rejects_non_json() {
        let err = JsonRpcRequest::from_slice(b"not json").unwrap_err();
        assert_eq!(err.id, None);

        let err = JsonRpcRequest::from_slice(b"[1,2,3]").unwrap_err();
        assert_eq!(err.id, None);
    }

    #[test]
    fn test_from_slice_recovers_id() {
        let err = JsonRpcRequest::from_slice(br#"{"id": 7, "method": 42}"#).unwrap_err();
        assert_eq!(err.id, Some(json!(7)));
    }

    #[test]
    fn test_string_ids_are_preserved() {
        let request =
            JsonRpcRequest::from_slice(br#"{"jsonrpc":"2.0","id":"abc-1","method":"initialize"}"#)
                .unwrap();
        assert_eq!(request.id, Some(json!("abc-1")));
    }
}

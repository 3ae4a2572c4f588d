//! MCP JSON-RPC message types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{Content, Info, ServerCapabilities, Tool};
use crate::error::rpc_codes;

/// JSON-RPC request or notification as received from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID member. `None` when absent (a notification);
    /// `Some(None)` for an explicit `"id": null`, which still gets a reply.
    #[allow(clippy::option_option)]
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Option<RequestId>>,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Validate a decoded JSON value as a JSON-RPC 2.0 request.
    ///
    /// On failure returns the error response to send back, carrying the
    /// request id when one could be recovered.
    pub fn from_value(value: Value) -> Result<Self, Box<JsonRpcResponse>> {
        let id = extract_request_id(&value);

        if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(Box::new(JsonRpcResponse::error(
                id,
                rpc_codes::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )));
        }
        if value.get("method").and_then(Value::as_str).is_none() {
            return Err(Box::new(JsonRpcResponse::error(
                id,
                rpc_codes::INVALID_REQUEST,
                "Invalid Request: missing method",
            )));
        }

        serde_json::from_value(value).map_err(|e| {
            Box::new(JsonRpcResponse::error(
                id,
                rpc_codes::INVALID_REQUEST,
                format!("Invalid Request: {e}"),
            ))
        })
    }

    /// Whether the sender expects no response
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Id to echo back in the response (`None` serializes as `null`)
    #[must_use]
    pub fn response_id(&self) -> Option<RequestId> {
        self.id.clone().flatten()
    }

    /// Whether this is the session-opening `initialize` request
    #[must_use]
    pub fn is_initialize(&self) -> bool {
        self.method == "initialize"
    }
}

/// Only reached when the `id` member exists, so `null` becomes `Some(None)`
#[allow(clippy::option_option)]
fn present_id<'de, D>(deserializer: D) -> Result<Option<Option<RequestId>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RequestId>::deserialize(deserializer).map(Some)
}

/// Best-effort id recovery from a possibly malformed request
#[must_use]
pub fn extract_request_id(value: &Value) -> Option<RequestId> {
    value
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

/// JSON-RPC response
///
/// Built only through [`JsonRpcResponse::success`] and
/// [`JsonRpcResponse::error`], so exactly one of `result` / `error` is set.
/// `id` is always serialized, as `null` when the request id is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: Option<RequestId>,
    /// Result (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Create an error response from a crate error
    #[must_use]
    pub fn from_error(id: Option<RequestId>, err: &crate::Error) -> Self {
        Self::error(id, err.to_rpc_code(), err.rpc_message())
    }
}

/// JSON-RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request ID (string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String ID
    String(String),
    /// Numeric ID
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

// ============================================================================
// Initialize
// ============================================================================

/// Initialize result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Server info
    #[serde(rename = "serverInfo")]
    pub server_info: Info,
    /// Optional instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ============================================================================
// Tools
// ============================================================================

/// Tools list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// List of tools
    pub tools: Vec<Tool>,
    /// Next cursor for pagination
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Tools call result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCallResult {
    /// Content items
    pub content: Vec<Content>,
    /// Whether result is an error
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolsCallResult {
    /// Successful single-text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Failed single-text result
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: true,
        }
    }
}

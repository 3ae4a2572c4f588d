//! JSON-RPC method routing and tool dispatch
//!
//! Transport-independent: every adapter hands a parsed request plus the
//! credential it resolved, and gets back the response to send (or `None`
//! for notifications).

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::credentials::Credential;
use crate::error::rpc_codes;
use crate::protocol::{
    Info, InitializeResult, JsonRpcRequest, JsonRpcResponse, RequestId, ServerCapabilities,
    ToolsCallResult, ToolsCapability, ToolsListResult, negotiate_version,
};
use crate::tools::{ToolContext, ToolRegistry, UpstreamClient};
use crate::{Error, Result, SERVER_NAME};

const INSTRUCTIONS: &str = "Token Metrics crypto analytics. Call tools/list for the available \
     endpoints; every tool is a read-only query against the Token Metrics API and requires an \
     API key (x-api-key header, apiKey query parameter, or TOKEN_METRICS_API_KEY).";

/// Routes JSON-RPC methods and runs tool calls
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    upstream: UpstreamClient,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and upstream client
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, upstream: UpstreamClient) -> Self {
        Self { registry, upstream }
    }

    /// The tool registry
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one request. Returns `None` for notifications.
    pub async fn handle(
        &self,
        request: JsonRpcRequest,
        credential: Option<&Credential>,
    ) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        let Some(id) = id else {
            debug!(method = %method, "Notification received");
            return None;
        };

        let response = match method.as_str() {
            "initialize" => Self::handle_initialize(id, params.as_ref()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, params, credential).await,
            other => {
                debug!(method = %other, "Unknown method");
                JsonRpcResponse::from_error(id, &Error::MethodNotFound(other.to_string()))
            }
        };
        Some(response)
    }

    /// Handle `initialize`. Needs no credential.
    #[must_use]
    pub fn handle_initialize(id: Option<RequestId>, params: Option<&Value>) -> JsonRpcResponse {
        let client_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or("2024-11-05");
        let negotiated = negotiate_version(client_version);
        debug!(
            client = client_version,
            negotiated = negotiated,
            "Protocol version negotiation"
        );

        let result = InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: Info {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };
        to_response(id, &result)
    }

    /// Handle `tools/list`. Needs no credential.
    #[must_use]
    pub fn handle_tools_list(&self, id: Option<RequestId>) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: self.registry.list(),
            next_cursor: None,
        };
        to_response(id, &result)
    }

    async fn handle_tools_call(
        &self,
        id: Option<RequestId>,
        params: Option<Value>,
        credential: Option<&Credential>,
    ) -> JsonRpcResponse {
        let (name, arguments) = match extract_tools_call_params(params) {
            Ok(parts) => parts,
            Err(e) => return JsonRpcResponse::from_error(id, &e),
        };

        match self.call_tool(&name, arguments, credential).await {
            Ok(result) => to_response(id, &result),
            Err(e) => JsonRpcResponse::from_error(id, &e),
        }
    }

    /// Run one tool call.
    ///
    /// Lookup happens before the credential check, so an unknown tool is
    /// reported as such even for anonymous callers.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        credential: Option<&Credential>,
    ) -> Result<ToolsCallResult> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        let credential = credential.ok_or(Error::MissingCredential)?.clone();

        let handler = descriptor.instantiate(ToolContext {
            upstream: self.upstream.clone(),
            credential,
        });

        info!(tool = %name, "Dispatching tool call");
        // Run on its own task so a panicking handler becomes an error envelope
        let outcome = tokio::spawn(async move { handler.call(arguments).await }).await;

        Ok(outcome.unwrap_or_else(|e| {
            error!(tool = %name, error = %e, "Tool handler failed");
            ToolsCallResult::error_text(format!("Error fetching data: tool {name} failed"))
        }))
    }
}

/// Split `tools/call` params into name and arguments.
///
/// `arguments` defaults to `{}`; a missing or non-string `name` is an
/// invalid-params error.
pub fn extract_tools_call_params(params: Option<Value>) -> Result<(String, Value)> {
    let mut params = params.unwrap_or(Value::Null);
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidParams("Missing required parameter: name".to_string()))?;

    let arguments = match params.get_mut("arguments").map(Value::take) {
        None | Some(Value::Null) => json!({}),
        Some(args) => args,
    };
    Ok((name, arguments))
}

fn to_response<T: serde::Serialize>(id: Option<RequestId>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, rpc_codes::INTERNAL_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::protocol::PROTOCOL_VERSION;
    use crate::tools::{ToolDescriptor, ToolHandler};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Echo(Credential);

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, arguments: Value) -> ToolsCallResult {
            ToolsCallResult::text(format!("{}|{}", self.0.expose(), arguments))
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolHandler for Panics {
        async fn call(&self, _arguments: Value) -> ToolsCallResult {
            panic!("handler blew up")
        }
    }

    fn dispatcher() -> Dispatcher {
        let registry = ToolRegistry::new(vec![
            ToolDescriptor {
                name: "echo".into(),
                description: "echo".into(),
                input_schema: json!({"type": "object"}),
                factory: Arc::new(|ctx: ToolContext| -> Box<dyn ToolHandler> {
                    Box::new(Echo(ctx.credential))
                }),
            },
            ToolDescriptor {
                name: "panics".into(),
                description: "panics".into(),
                input_schema: json!({"type": "object"}),
                factory: Arc::new(|_ctx: ToolContext| -> Box<dyn ToolHandler> { Box::new(Panics) }),
            },
        ])
        .unwrap();
        let upstream = UpstreamClient::new(&UpstreamConfig::default()).unwrap();
        Dispatcher::new(Arc::new(registry), upstream)
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(Some(RequestId::Number(id))),
            method: method.into(),
            params: Some(params),
        }
    }

    fn cred(s: &str) -> Credential {
        Credential::new(s).unwrap()
    }

    #[tokio::test]
    async fn initialize_needs_no_credential() {
        let resp = dispatcher()
            .handle(request(1, "initialize", json!({"protocolVersion": "2024-11-05"})), None)
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn initialize_with_unknown_version_gets_latest() {
        let resp = Dispatcher::handle_initialize(
            Some(RequestId::Number(1)),
            Some(&json!({"protocolVersion": "1999-01-01"})),
        );
        assert_eq!(resp.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn tools_list_is_stable() {
        let d = dispatcher();
        let a = d.handle(request(1, "tools/list", json!({})), None).await.unwrap();
        let b = d.handle(request(2, "tools/list", json!({})), None).await.unwrap();
        assert_eq!(a.result, b.result);
        let names: Vec<_> = a.result.unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["echo", "panics"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found_even_without_credential() {
        let resp = dispatcher()
            .handle(request(3, "tools/call", json!({"name": "nope"})), None)
            .await
            .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Unknown tool: nope");
        assert_eq!(resp.id, Some(RequestId::Number(3)));
    }

    #[tokio::test]
    async fn missing_credential_is_invalid_request() {
        let resp = dispatcher()
            .handle(request(4, "tools/call", json!({"name": "echo"})), None)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn missing_name_is_invalid_params() {
        let resp = dispatcher()
            .handle(request(5, "tools/call", json!({"arguments": {}})), Some(&cred("k")))
            .await
            .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Missing required parameter: name");
    }

    #[tokio::test]
    async fn tool_gets_call_credential_and_default_arguments() {
        let resp = dispatcher()
            .handle(request(6, "tools/call", json!({"name": "echo"})), Some(&cred("abc")))
            .await
            .unwrap();
        let result: ToolsCallResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content[0].as_text(), "abc|{}");
    }

    #[tokio::test]
    async fn each_call_is_bound_to_its_own_credential() {
        let d = dispatcher();
        let a = d.call_tool("echo", json!({}), Some(&cred("alice"))).await.unwrap();
        let b = d.call_tool("echo", json!({}), Some(&cred("bob"))).await.unwrap();
        assert_eq!(a.content[0].as_text(), "alice|{}");
        assert_eq!(b.content[0].as_text(), "bob|{}");
    }

    #[tokio::test]
    async fn panicking_handler_becomes_error_envelope() {
        let result = dispatcher()
            .call_tool("panics", json!({}), Some(&cred("k")))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn unknown_method_and_notifications() {
        let d = dispatcher();
        let resp = d.handle(request(7, "resources/list", json!({})), None).await.unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found: resources/list");

        let note = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "notifications/initialized".into(),
            params: None,
        };
        assert!(d.handle(note, None).await.is_none());
    }

    #[tokio::test]
    async fn null_id_request_is_answered_with_null_id() {
        let d = dispatcher();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(None),
            method: "tools/list".into(),
            params: None,
        };
        let resp = d.handle(req, None).await.unwrap();
        assert_eq!(resp.id, None);
        assert!(resp.result.unwrap()["tools"].is_array());

        let call = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(None),
            method: "tools/call".into(),
            params: Some(json!({"name": "echo"})),
        };
        let resp = d.handle(call, Some(&cred("k"))).await.unwrap();
        assert_eq!(resp.result.unwrap()["content"][0]["text"], "k|{}");
    }

    #[test]
    fn null_arguments_default_to_empty_object() {
        let (name, args) =
            extract_tools_call_params(Some(json!({"name": "x", "arguments": null}))).unwrap();
        assert_eq!(name, "x");
        assert_eq!(args, json!({}));
        assert!(extract_tools_call_params(None).is_err());
        assert!(extract_tools_call_params(Some(json!({"name": 5}))).is_err());
    }
}

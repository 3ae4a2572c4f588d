//! HTTP router and handlers
//!
//! - `/` Streamable HTTP (POST requests, GET notification stream, DELETE)
//! - `/sse` + `/messages` legacy HTTP+SSE
//! - `/health` liveness check

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, Request, StatusCode, Uri,
        header::{ACCEPT, ALLOW},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::perimeter::{self, HEALTH_PATH, SESSION_HEADER, origin_guard};
use super::session::SessionManager;
use super::streaming::{
    MESSAGES_PATH, legacy_sse_response, notification_sse_response, single_response_sse,
};
use crate::config::{Config, StreamingConfig};
use crate::credentials::{API_KEY_HEADER, Credential, resolve_credential};
use crate::error::rpc_codes;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::security::OriginPolicy;
use crate::tools::{ToolRegistry, UpstreamClient};
use crate::{Error, Result, SERVER_NAME};

/// Shared application state
pub struct AppState {
    /// Method router and tool dispatcher
    pub dispatcher: Dispatcher,
    /// Live sessions of both HTTP transports
    pub sessions: SessionManager,
    /// Host/Origin policy
    pub origin_policy: Arc<OriginPolicy>,
    /// Process-wide fallback credential
    pub default_credential: Option<Credential>,
    /// Streaming configuration
    pub streaming: StreamingConfig,
    /// Maximum accepted request body, in bytes
    pub max_body_size: usize,
}

impl AppState {
    /// Build state from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(ToolRegistry::token_metrics()?);
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self::new(Dispatcher::new(registry, upstream), config))
    }

    /// Build state around an existing dispatcher
    #[must_use]
    pub fn new(dispatcher: Dispatcher, config: &Config) -> Self {
        Self {
            dispatcher,
            sessions: SessionManager::new(config.streaming.buffer_size),
            origin_policy: Arc::new(OriginPolicy::new(
                config.security.allowed_origins.clone(),
            )),
            default_credential: config.default_credential(),
            streaming: config.streaming.clone(),
            max_body_size: config.server.max_body_size,
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let policy = Arc::clone(&state.origin_policy);

    let router = Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(
            "/",
            post(mcp_post_handler)
                .get(mcp_get_handler)
                .delete(mcp_delete_handler),
        )
        .route("/sse", get(sse_handler).post(sse_handler))
        .route(MESSAGES_PATH, post(messages_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(policy, origin_guard));

    perimeter::harden(router).with_state(state)
}

/// Query parameters understood by the MCP endpoints
#[derive(Debug, Default, Deserialize)]
struct McpQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

impl McpQuery {
    fn from_uri(uri: &Uri) -> Self {
        Query::<Self>::try_from_uri(uri)
            .map(|Query(q)| q)
            .unwrap_or_default()
    }
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": SERVER_NAME,
        "sessions": {
            "streamable": state.sessions.streamable_count(),
            "sse": state.sessions.sse_count(),
        }
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found" })),
    )
}

/// POST / - Streamable HTTP request
async fn mcp_post_handler(
    State(state): State<Arc<AppState>>,
    http_request: Request<Body>,
) -> Response {
    let (parts, body) = http_request.into_parts();
    let query = McpQuery::from_uri(&parts.uri);

    let request = match read_request(body, state.max_body_size).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let session = match header_str(&parts.headers, SESSION_HEADER) {
        Some(id) => match state.sessions.streamable(id) {
            Ok(session) => session,
            Err(e) => {
                debug!(session_id = %id, error = %e, "Rejected Streamable HTTP request");
                return rpc_error_response(StatusCode::BAD_REQUEST, None, &e);
            }
        },
        None if request.is_initialize() => state.sessions.create_streamable(),
        None => {
            return rpc_error_response(StatusCode::BAD_REQUEST, None, &Error::SessionNotFound);
        }
    };
    let session_id = session.id().to_string();

    let credential = resolve_credential(
        header_str(&parts.headers, API_KEY_HEADER),
        query.api_key.as_deref(),
        state.default_credential.as_ref(),
    );

    if needs_credential(&state.dispatcher, &request) && credential.is_none() {
        warn!(session_id = %session_id, "tools/call rejected: no API key");
        let response = rpc_error_response(
            StatusCode::BAD_REQUEST,
            request.response_id(),
            &Error::MissingCredential,
        );
        return with_session_header(response, &session_id);
    }

    debug!(method = %request.method, session_id = %session_id, "Streamable HTTP request");

    if request.is_notification() {
        state.dispatcher.handle(request, None).await;
        return with_session_header(StatusCode::ACCEPTED.into_response(), &session_id);
    }

    // Taken before spawning so requests keep their arrival order
    let turn = session.acquire().await;
    let dispatcher = state.dispatcher.clone();
    let task = tokio::spawn(async move {
        let _turn = turn;
        let response = dispatcher.handle(request, credential.as_ref()).await;
        session.touch();
        response
    });

    let response = if prefers_event_stream(&parts.headers) {
        single_response_sse(task).into_response()
    } else {
        match task.await {
            Ok(Some(response)) => Json(response).into_response(),
            Ok(None) => StatusCode::ACCEPTED.into_response(),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Dispatch task failed");
                rpc_error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                    &Error::Internal(e.to_string()),
                )
            }
        }
    };
    with_session_header(response, &session_id)
}

/// GET / - stream of server-initiated messages for an existing session
async fn mcp_get_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = header_str(&headers, SESSION_HEADER)
        .and_then(|id| state.sessions.streamable(id).ok());

    let Some(session) = session else {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(ALLOW, HeaderValue::from_static("POST"))],
            Json(json!({
                "jsonrpc": "2.0",
                "error": {"code": rpc_codes::SERVER_ERROR_START, "message": "Method Not Allowed"},
                "id": null
            })),
        )
            .into_response();
    };

    info!(session_id = %session.id(), "Client opened notification stream");
    let sse = notification_sse_response(session.subscribe(), state.streaming.keep_alive_interval);
    with_session_header(sse.into_response(), session.id())
}

/// DELETE / - session termination
async fn mcp_delete_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match header_str(&headers, SESSION_HEADER) {
        Some(id) if state.sessions.streamable(id).is_ok() => {
            state.sessions.close(id);
            info!(session_id = %id, "Session terminated by client");
            StatusCode::NO_CONTENT
        }
        Some(id) => {
            debug!(session_id = %id, "Session not found for DELETE");
            StatusCode::NOT_FOUND
        }
        None => StatusCode::BAD_REQUEST,
    }
}

/// GET|POST /sse - open a legacy SSE stream
async fn sse_handler(State(state): State<Arc<AppState>>, http_request: Request<Body>) -> Response {
    let query = McpQuery::from_uri(http_request.uri());
    let credential = resolve_credential(
        header_str(http_request.headers(), API_KEY_HEADER),
        query.api_key.as_deref(),
        None,
    );

    let (session, rx, guard) = state.sessions.create_sse(credential);
    info!(session_id = %session.id(), "Legacy SSE client connected");

    legacy_sse_response(guard, rx, state.streaming.keep_alive_interval).into_response()
}

/// POST /messages?sessionId= - legacy SSE request; the response goes out
/// on the session's stream
async fn messages_handler(
    State(state): State<Arc<AppState>>,
    http_request: Request<Body>,
) -> Response {
    let (parts, body) = http_request.into_parts();
    let query = McpQuery::from_uri(&parts.uri);

    let session = match query.session_id.as_deref().map(|id| state.sessions.sse(id)) {
        Some(Ok(session)) => session,
        Some(Err(Error::WrongTransport)) => {
            return rpc_error_response(StatusCode::BAD_REQUEST, None, &Error::WrongTransport);
        }
        _ => {
            debug!(session_id = ?query.session_id, "No SSE transport for message");
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    None,
                    rpc_codes::SERVER_ERROR_START,
                    "No transport found for sessionId",
                )),
            )
                .into_response();
        }
    };

    let request = match read_request(body, state.max_body_size).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let fallback = session
        .credential()
        .or(state.default_credential.as_ref());
    let credential = resolve_credential(
        header_str(&parts.headers, API_KEY_HEADER),
        query.api_key.as_deref(),
        fallback,
    );

    debug!(method = %request.method, session_id = %session.id(), "Legacy SSE message");

    // No ordering across messages of one SSE session
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let Some(response) = dispatcher.handle(request, credential.as_ref()).await else {
            return;
        };
        match serde_json::to_value(&response) {
            Ok(message) => {
                if let Err(e) = session.send(message).await {
                    debug!(session_id = %session.id(), error = %e, "Response discarded");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize response"),
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Read and validate one JSON-RPC request body.
///
/// Batches are not supported and are rejected as invalid requests.
async fn read_request(
    body: Body,
    limit: usize,
) -> std::result::Result<JsonRpcRequest, Response> {
    let bytes: Bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        warn!(error = %e, "Failed to read request body");
        (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(
                None,
                rpc_codes::PARSE_ERROR,
                format!("Failed to read body: {e}"),
            )),
        )
            .into_response()
    })?;

    let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
        debug!(error = %e, "Invalid JSON body");
        rpc_error_response(StatusCode::BAD_REQUEST, None, &Error::Json(e))
    })?;

    if value.is_array() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(
                None,
                rpc_codes::INVALID_REQUEST,
                "Invalid Request: batch requests are not supported",
            )),
        )
            .into_response());
    }

    JsonRpcRequest::from_value(value)
        .map_err(|response| (StatusCode::BAD_REQUEST, Json(*response)).into_response())
}

/// Whether `request` is a `tools/call` for a registered tool.
///
/// Unknown tools are left to the dispatcher so they are reported as such.
fn needs_credential(dispatcher: &Dispatcher, request: &JsonRpcRequest) -> bool {
    if request.method != "tools/call" || request.is_notification() {
        return false;
    }
    request
        .params
        .as_ref()
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .is_some_and(|name| dispatcher.registry().get(name).is_some())
}

fn prefers_event_stream(headers: &HeaderMap) -> bool {
    let accept = header_str(headers, ACCEPT.as_str()).unwrap_or("");
    accept.contains("text/event-stream") && !accept.contains("application/json")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn rpc_error_response(status: StatusCode, id: Option<RequestId>, err: &Error) -> Response {
    (status, Json(JsonRpcResponse::from_error(id, err))).into_response()
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

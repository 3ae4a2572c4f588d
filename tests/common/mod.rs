//! Shared fixtures: a fake Token Metrics API and a gateway on an ephemeral port

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use token_metrics_mcp::config::Config;
use token_metrics_mcp::gateway::Gateway;

/// One request observed by the fake upstream
#[derive(Debug, Clone)]
pub struct Seen {
    pub api_key: Option<String>,
    pub query: HashMap<String, String>,
}

pub type SeenLog = Arc<Mutex<Vec<Seen>>>;

/// `token_id` value that makes the fake upstream stall
pub const SLOW_TOKEN: &str = "slow";

/// Serves `/price` and `/tokens`
async fn price(
    State(seen): State<SeenLog>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.lock().unwrap().push(Seen {
        api_key: api_key.clone(),
        query: query.clone(),
    });

    if api_key.as_deref() == Some("bad-key") {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    if query.get("token_id").map(String::as_str) == Some(SLOW_TOKEN) {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    Json(json!({
        "success": true,
        "data": [{
            "TOKEN_ID": query.get("token_id").cloned().unwrap_or_default(),
            "TOKEN_NAME": "Bitcoin",
            "CURRENT_PRICE": 64000.5
        }]
    }))
    .into_response()
}

/// Start the fake upstream; returns its base URL and request log
pub async fn spawn_fake_upstream() -> (String, SeenLog) {
    let seen: SeenLog = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/price", get(price))
        .route("/tokens", get(price))
        .with_state(Arc::clone(&seen));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

/// Gateway config pointing at `upstream`
pub fn config(upstream: &str, default_key: Option<&str>) -> Config {
    let mut config = Config::default();
    config.upstream.base_url = upstream.to_string();
    config.upstream.timeout = Duration::from_secs(5);
    config.api_key = default_key.map(str::to_string);
    config.streaming.keep_alive_interval = Duration::from_millis(100);
    config
}

/// Start a gateway; returns its base URL
pub async fn spawn_gateway(config: Config) -> String {
    let gateway = Gateway::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(gateway.serve(listener, std::future::pending()));
    format!("http://{addr}")
}

/// JSON-RPC `tools/call` body for `get_token_price`
pub fn token_price_call(id: i64, token_id: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": "get_token_price", "arguments": {"token_id": token_id}}
    })
}

/// JSON-RPC `tools/call` body for any tool
pub fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

/// JSON-RPC `initialize` body
pub fn initialize(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "0.0.0"}
        }
    })
}

//! End-to-end legacy HTTP+SSE tests
//!
//! - the first event announces the `/messages` endpoint
//! - responses to `/messages` posts arrive as `message` events
//! - keep-alive comments flow while idle
//! - disconnecting the stream invalidates the session

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

use common::{config, spawn_fake_upstream, spawn_gateway, token_price_call};

/// Incremental reader over an SSE response body
struct EventStream {
    response: reqwest::Response,
    buffer: String,
}

impl EventStream {
    async fn open(url: &str) -> Self {
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Read until the buffer contains `needle`; returns and drains everything
    /// up to and including the frame that holds it.
    async fn read_until(&mut self, needle: &str) -> String {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(pos) = self.buffer.find(needle) {
                    let end = self.buffer[pos..]
                        .find("\n\n")
                        .map_or(self.buffer.len(), |i| pos + i + 2);
                    return self.buffer.drain(..end).collect();
                }
                let chunk = self.response.chunk().await.unwrap().expect("stream ended");
                self.buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("timed out waiting for SSE data")
    }

    /// Next `event: message` payload
    async fn next_message(&mut self) -> Value {
        let frame = self.read_until("event: message").await;
        let data = frame
            .lines()
            .rev()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap();
        serde_json::from_str(data).unwrap()
    }
}

async fn open_session(base: &str, query: &str) -> (EventStream, String) {
    let mut stream = EventStream::open(&format!("{base}/sse{query}")).await;
    let frame = stream.read_until("event: endpoint").await;
    let endpoint = frame
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .unwrap()
        .to_string();
    assert!(endpoint.starts_with("/messages?sessionId="));
    (stream, endpoint)
}

async fn post_message(base: &str, endpoint: &str, body: &Value) -> StatusCode {
    reqwest::Client::new()
        .post(format!("{base}{endpoint}"))
        .json(body)
        .send()
        .await
        .unwrap()
        .status()
}

/// Endpoint event first, then responses as message events
#[tokio::test]
async fn test_endpoint_event_and_message_delivery() {
    let (upstream, _seen) = spawn_fake_upstream().await;
    let base = spawn_gateway(config(&upstream, None)).await;
    let (mut stream, endpoint) = open_session(&base, "").await;

    let init = json!({
        "jsonrpc": "2.0", "id": 1, "method": "initialize",
        "params": {"protocolVersion": "2024-11-05", "capabilities": {}}
    });
    assert_eq!(post_message(&base, &endpoint, &init).await, StatusCode::ACCEPTED);
    let message = stream.next_message().await;
    assert_eq!(message["id"], 1);
    assert_eq!(message["result"]["protocolVersion"], "2024-11-05");

    let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    assert_eq!(post_message(&base, &endpoint, &list).await, StatusCode::ACCEPTED);
    let message = stream.next_message().await;
    assert_eq!(message["id"], 2);
    assert!(message["result"]["tools"].as_array().unwrap().len() > 1);
}

/// Credential given when opening the stream serves later `/messages` posts
#[tokio::test]
async fn test_connect_credential_is_bound_to_session() {
    let (upstream, seen) = spawn_fake_upstream().await;
    let base = spawn_gateway(config(&upstream, Some("default-key"))).await;
    let query = format!("?{}", serde_urlencoded::to_string([("apiKey", "sse-key")]).unwrap());
    let (mut stream, endpoint) = open_session(&base, &query).await;

    assert_eq!(
        post_message(&base, &endpoint, &token_price_call(3, "3375")).await,
        StatusCode::ACCEPTED
    );
    let message = stream.next_message().await;
    assert_eq!(message["id"], 3);
    assert_eq!(message["result"].get("isError"), None);
    assert_eq!(seen.lock().unwrap()[0].api_key.as_deref(), Some("sse-key"));
}

/// Without any credential the call fails in-band on the stream
#[tokio::test]
async fn test_missing_credential_is_reported_on_stream() {
    let (upstream, seen) = spawn_fake_upstream().await;
    let base = spawn_gateway(config(&upstream, None)).await;
    let (mut stream, endpoint) = open_session(&base, "").await;

    post_message(&base, &endpoint, &token_price_call(4, "1")).await;
    let message = stream.next_message().await;
    assert_eq!(message["error"]["code"], -32600);
    assert!(seen.lock().unwrap().is_empty());
}

/// Idle streams carry keep-alive comments
#[tokio::test]
async fn test_keep_alive_while_idle() {
    let (upstream, _seen) = spawn_fake_upstream().await;
    let base = spawn_gateway(config(&upstream, None)).await;
    let (mut stream, _endpoint) = open_session(&base, "").await;

    let frame = stream.read_until("ping").await;
    assert!(frame.trim_start().starts_with(':'));
}

/// Dropping the stream closes the session
#[tokio::test]
async fn test_disconnect_invalidates_session() {
    let (upstream, _seen) = spawn_fake_upstream().await;
    let base = spawn_gateway(config(&upstream, None)).await;
    let (stream, endpoint) = open_session(&base, "").await;
    drop(stream);

    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
    let mut status = StatusCode::ACCEPTED;
    for _ in 0..50 {
        status = post_message(&base, &endpoint, &ping).await;
        if status == StatusCode::BAD_REQUEST {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// An SSE session id is not accepted by the Streamable HTTP endpoint
#[tokio::test]
async fn test_sse_session_rejected_on_streamable_endpoint() {
    let (upstream, _seen) = spawn_fake_upstream().await;
    let base = spawn_gateway(config(&upstream, None)).await;
    let (_stream, endpoint) = open_session(&base, "").await;
    let session_id = endpoint.trim_start_matches("/messages?sessionId=");

    let resp = reqwest::Client::new()
        .post(format!("{base}/"))
        .header("mcp-session-id", session_id)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["message"],
        "Bad Request: Session exists but uses a different transport protocol"
    );
}

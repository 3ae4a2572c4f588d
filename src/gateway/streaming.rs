//! SSE response bodies
//!
//! - legacy `/sse` stream: `endpoint` event, then one `message` event per
//!   JSON-RPC response posted to `/messages`
//! - Streamable HTTP `GET /` stream: server-initiated messages for a session
//! - single-response stream for `POST /` clients that only accept SSE

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, error};

use super::session::SessionGuard;
use crate::error::rpc_codes;
use crate::protocol::JsonRpcResponse;

/// Path clients post legacy SSE messages to
pub const MESSAGES_PATH: &str = "/messages";

fn keep_alive(interval: Duration) -> KeepAlive {
    KeepAlive::new().interval(interval).text("ping")
}

fn message_event(message: &impl serde::Serialize) -> Event {
    Event::default()
        .event("message")
        .data(serde_json::to_string(message).unwrap_or_default())
}

/// Legacy SSE stream for one session.
///
/// Owns the session guard: when the client disconnects the stream is
/// dropped and the session is removed with it.
pub fn legacy_sse_response(
    guard: SessionGuard,
    mut rx: mpsc::Receiver<Value>,
    keep_alive_interval: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        let guard = guard;
        let endpoint = format!("{MESSAGES_PATH}?sessionId={}", guard.id());
        yield Ok(Event::default().event("endpoint").data(endpoint));

        while let Some(message) = rx.recv().await {
            yield Ok(message_event(&message));
        }
        debug!(session_id = %guard.id(), "SSE message queue closed");
    };

    Sse::new(stream).keep_alive(keep_alive(keep_alive_interval))
}

/// Streamable HTTP `GET /` stream of server-initiated messages
pub fn notification_sse_response(
    rx: broadcast::Receiver<Value>,
    keep_alive_interval: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(rx).map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(message) => message_event(&message),
            Err(BroadcastStreamRecvError::Lagged(missed)) => Event::default()
                .event("lagged")
                .data(json!({ "missed": missed }).to_string()),
        })
    });

    Sse::new(stream).keep_alive(keep_alive(keep_alive_interval))
}

/// One-shot SSE body carrying the response of an in-flight dispatch.
///
/// Headers are sent before the dispatch finishes; if the task fails after
/// that point the failure goes out in-band as an `error` event.
pub fn single_response_sse(
    task: JoinHandle<Option<JsonRpcResponse>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        match task.await {
            Ok(Some(response)) => yield Ok(message_event(&response)),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Dispatch task failed after headers were sent");
                let response = JsonRpcResponse::error(
                    None,
                    rpc_codes::INTERNAL_ERROR,
                    "Internal server error",
                );
                yield Ok(Event::default()
                    .event("error")
                    .data(serde_json::to_string(&response).unwrap_or_default()));
            }
        }
    };

    Sse::new(stream)
}

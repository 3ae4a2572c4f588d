//! Token Metrics REST client
//!
//! # Security
//!
//! The caller's credential is injected as the `x-api-key` header at send
//! time. It is never logged, never placed in the URL, and never included
//! in error messages.

use std::time::Duration;

use reqwest::{Client, header::ACCEPT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::credentials::{API_KEY_HEADER, Credential};
use crate::{Error, Result};

/// Argument names that must never be forwarded upstream as query parameters
const RESERVED_ARGS: &[&str] = &["api_key", "apiKey"];

/// Shared, cheaply clonable upstream client
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a client for the configured base URL and timeout
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("token-metrics-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }

    /// Base URL every path is appended to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `<base_url><path>` with `arguments` as query parameters
    pub async fn get(&self, path: &str, arguments: &Value, credential: &Credential) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let query = build_query(arguments);
        debug!(url = %url, params = query.len(), "Upstream request");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .header(ACCEPT, "application/json")
            .header(API_KEY_HEADER, credential.expose())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(url = %url, status = status.as_u16(), "Upstream returned error status");
            return Err(Error::Upstream {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Protocol(format!("Failed to parse response: {e}")))
    }

    fn classify(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::UpstreamTimeout(self.timeout)
        } else if e.is_connect() {
            Error::UpstreamUnreachable
        } else {
            Error::Transport(format!("Request failed: {}", e.without_url()))
        }
    }
}

/// Flatten call arguments into query pairs.
///
/// Nulls are dropped, scalars stringified, arrays comma-joined, nested
/// objects sent as JSON text.
#[must_use]
pub fn build_query(arguments: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = arguments else {
        return Vec::new();
    };

    map.iter()
        .filter(|(key, _)| !RESERVED_ARGS.contains(&key.as_str()))
        .filter_map(|(key, value)| query_value(value).map(|v| (key.clone(), v)))
        .collect()
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(query_value).collect();
            Some(parts.join(","))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

//! `search` and `fetch` tools
//!
//! `search` accepts a small query language over the v2 endpoints:
//!
//! ```text
//! endpoint:<key> field:value field:"quoted value" ...
//! ```
//!
//! Without a leading `endpoint:` token the query targets `tokens`. Values
//! may be wrapped in single or double quotes to carry spaces.
//!
//! `fetch` looks up one token by its numeric id.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use super::catalog::failure_reason;
use super::{ToolContext, ToolDescriptor, ToolHandler};
use crate::protocol::ToolsCallResult;

/// Endpoint keys understood by `search`, with their paths
pub const SEARCH_ENDPOINTS: &[(&str, &str)] = &[
    ("tokens", "/tokens"),
    ("price", "/price"),
    ("daily-ohlcv", "/daily-ohlcv"),
    ("hourly-ohlcv", "/hourly-ohlcv"),
    ("trader-grades", "/trader-grades"),
    ("investor-grades", "/investor-grades"),
    ("trading-signals", "/trading-signals"),
    ("hourly-trading-signals", "/hourly-trading-signals"),
    ("market-metrics", "/market-metrics"),
    ("resistance-support", "/resistance-support"),
    ("scenario-analysis", "/scenario-analysis"),
    ("correlation", "/correlation"),
    ("quantmetrics", "/quantmetrics"),
    ("sentiments", "/sentiments"),
    ("ai-reports", "/ai-reports"),
    ("crypto-investors", "/crypto-investors"),
    ("top-market-cap-tokens", "/top-market-cap-tokens"),
    ("indices", "/indices"),
    ("indices-holdings", "/indices-holdings"),
    ("indices-performance", "/indices-performance"),
];

const DEFAULT_ENDPOINT: &str = "tokens";
const ENDPOINT_PREFIX: &str = "endpoint:";

/// Why a search query could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Nothing but whitespace
    #[error("empty query string")]
    Empty,
    /// A quote was opened and never closed
    #[error("Unclosed quote in query: {0}")]
    UnclosedQuote(String),
    /// `endpoint:` names no known endpoint
    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),
    /// A filter token without a colon
    #[error("malformed token '{0}' - expected field:value")]
    MalformedToken(String),
}

/// A parsed search query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Endpoint key, e.g. `price`
    pub endpoint: String,
    /// Path appended to the base URL
    pub path: &'static str,
    /// Field filters, sent as query parameters. Later duplicates win.
    pub params: Map<String, Value>,
}

/// Parse `endpoint:<key> field:value ...`
pub fn parse_query(query: &str) -> Result<SearchQuery, QueryError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QueryError::Empty);
    }

    let tokens = tokenize(query)?;
    let (endpoint, filters) = match tokens.split_first() {
        Some((first, rest)) if first.starts_with(ENDPOINT_PREFIX) => {
            (&first[ENDPOINT_PREFIX.len()..], rest)
        }
        _ => (DEFAULT_ENDPOINT, tokens.as_slice()),
    };

    let path = SEARCH_ENDPOINTS
        .iter()
        .find(|(key, _)| *key == endpoint)
        .map(|&(_, path)| path)
        .ok_or_else(|| QueryError::UnknownEndpoint(endpoint.to_string()))?;

    let mut params = Map::new();
    for token in filters {
        let (field, value) = token
            .split_once(':')
            .ok_or_else(|| QueryError::MalformedToken(token.clone()))?;
        params.insert(field.to_string(), Value::String(unquote(value).to_string()));
    }

    Ok(SearchQuery {
        endpoint: endpoint.to_string(),
        path,
        params,
    })
}

/// Split on whitespace outside quotes. Quotes stay in the token.
fn tokenize(query: &str) -> Result<Vec<String>, QueryError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in query.chars() {
        match quote {
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            Some(open) if c == open => {
                quote = None;
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(QueryError::UnclosedQuote(query.to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unquote(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted { &value[1..value.len() - 1] } else { value }
}

fn search_description() -> String {
    let keys: Vec<&str> = SEARCH_ENDPOINTS.iter().map(|(key, _)| *key).collect();
    format!(
        "Search the Token Metrics v2 API for prices, grades, signals, indices, research content \
         and analytics.\n\n\
         Query syntax: start with endpoint:<key>, then any number of space-separated field:value \
         filters. Comma-separate multiple values (symbol:BTC,ETH). Quote values containing spaces \
         (token_name:\"Bitcoin Cash\"). Dates are YYYY-MM-DD. Without an endpoint the query runs \
         against tokens; use endpoint:tokens first to find the token_id of a token.\n\n\
         Examples:\n  endpoint:price token_id:3375\n  \
         endpoint:trader-grades symbol:BTC startDate:2024-11-01 endDate:2025-01-01\n\n\
         Endpoints: {}",
        keys.join(", ")
    )
}

/// Descriptors for `search` and `fetch`
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "search".to_string(),
            description: search_description(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query." }
                },
                "required": ["query"],
            }),
            factory: Arc::new(|ctx: ToolContext| -> Box<dyn ToolHandler> {
                Box::new(SearchTool { ctx })
            }),
        },
        ToolDescriptor {
            name: "fetch".to_string(),
            description: "Fetches detailed token data for a specific token ID from Token Metrics API."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Token ID to fetch data for." }
                },
                "required": ["id"],
            }),
            factory: Arc::new(|ctx: ToolContext| -> Box<dyn ToolHandler> {
                Box::new(FetchTool { ctx })
            }),
        },
    ]
}

struct SearchTool {
    ctx: ToolContext,
}

#[async_trait]
impl ToolHandler for SearchTool {
    async fn call(&self, arguments: Value) -> ToolsCallResult {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let parsed = match parse_query(query) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Rejected search query");
                return ToolsCallResult::error_text(format!("Error performing search: {e}"));
            }
        };

        let params = Value::Object(parsed.params);
        match self
            .ctx
            .upstream
            .get(parsed.path, &params, &self.ctx.credential)
            .await
        {
            Ok(data) => {
                debug!(endpoint = %parsed.endpoint, "Search succeeded");
                ToolsCallResult::text(serde_json::to_string_pretty(&data).unwrap_or_default())
            }
            Err(e) => {
                warn!(endpoint = %parsed.endpoint, error = %e, "Search failed");
                ToolsCallResult::error_text(format!(
                    "Error performing search: {}",
                    failure_reason(&e)
                ))
            }
        }
    }
}

struct FetchTool {
    ctx: ToolContext,
}

/// Numeric token id from a string or number argument
fn token_id(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[async_trait]
impl ToolHandler for FetchTool {
    async fn call(&self, arguments: Value) -> ToolsCallResult {
        let raw = arguments.get("id").cloned().unwrap_or(Value::Null);
        let Some(id) = token_id(&raw) else {
            return ToolsCallResult::error_text(format!(
                "Error fetching token data: invalid token id {raw}"
            ));
        };

        let params = json!({ "token_id": id, "limit": 1 });
        match self
            .ctx
            .upstream
            .get("/tokens", &params, &self.ctx.credential)
            .await
        {
            Ok(data) => ToolsCallResult::text(serde_json::to_string_pretty(&data).unwrap_or_default()),
            Err(e) => {
                warn!(token_id = id, error = %e, "Fetch failed");
                ToolsCallResult::error_text(format!(
                    "Error fetching token data: {}",
                    failure_reason(&e)
                ))
            }
        }
    }
}

//! Error types for the Token Metrics MCP server

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for the Token Metrics MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Token Metrics MCP server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested tool is not in the registry
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// Requested JSON-RPC method is not implemented
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A tool call arrived without any credential
    #[error(
        "API key required. Provide the x-api-key header, the apiKey query parameter, or set TOKEN_METRICS_API_KEY."
    )]
    MissingCredential,

    /// Invalid or missing parameters
    #[error("{0}")]
    InvalidParams(String),

    /// Session id is unknown (or missing where one is required)
    #[error("Bad Request: No valid session ID provided")]
    SessionNotFound,

    /// Session id exists but belongs to the other HTTP transport
    #[error("Bad Request: Session exists but uses a different transport protocol")]
    WrongTransport,

    /// Upstream API answered with a non-success status
    #[error("API Error ({status}): {body}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Response body as text
        body: String,
    },

    /// Upstream API could not be reached
    #[error("Network error: Unable to reach Token Metrics API")]
    UpstreamUnreachable,

    /// Upstream API did not answer in time
    #[error("Request timed out after {0:?}")]
    UpstreamTimeout(Duration),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) | Self::MissingCredential => rpc_codes::INVALID_REQUEST,
            Self::ToolNotFound(_) | Self::MethodNotFound(_) => rpc_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => rpc_codes::INVALID_PARAMS,
            Self::SessionNotFound
            | Self::WrongTransport
            | Self::Transport(_)
            | Self::Upstream { .. }
            | Self::UpstreamUnreachable
            | Self::UpstreamTimeout(_) => rpc_codes::SERVER_ERROR_START,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// Message suitable for a JSON-RPC error object
    #[must_use]
    pub fn rpc_message(&self) -> String {
        match self {
            Self::Json(_) => "Parse error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
}

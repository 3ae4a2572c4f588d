//! Token Metrics MCP Server Library
//!
//! Exposes the Token Metrics crypto analytics API as Model Context Protocol
//! tools.
//!
//! # Features
//!
//! - **Tool catalog**: one read-only tool per Token Metrics v2 endpoint
//! - **Multi-Transport**: stdio, Streamable HTTP and legacy HTTP+SSE
//! - **Per-request credentials**: `x-api-key` header, `apiKey` query
//!   parameter, or a process-wide default
//! - **DNS rebinding protection**: Host/Origin cross-check on every HTTP route
//!
//! # Protocol Version
//!
//! Implements MCP protocol versions 2024-11-05 and 2025-03-26 (Streamable HTTP).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod security;
pub mod tools;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name reported in `serverInfo` and `/health`
pub const SERVER_NAME: &str = "Token Metrics MCP Server";

/// Setup tracing/logging.
///
/// Always writes to stderr: in stdio mode stdout is the protocol channel.
/// `RUST_LOG` takes precedence over `level`.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}

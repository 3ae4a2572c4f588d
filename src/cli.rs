//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::credentials::API_KEY_ENV;

/// Token Metrics MCP Server - crypto analytics tools over MCP
#[derive(Parser, Debug)]
#[command(name = "token-metrics-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TOKEN_METRICS_MCP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Default Token Metrics API key, used when a request carries none
    #[arg(long, env = API_KEY_ENV, global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "TOKEN_METRICS_MCP_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "TOKEN_METRICS_MCP_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to stdio mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve MCP over stdin/stdout (default)
    Stdio,

    /// Serve MCP over HTTP (Streamable HTTP and legacy SSE)
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "TOKEN_METRICS_MCP_PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "TOKEN_METRICS_MCP_HOST")]
        host: Option<String>,
    },

    /// Print the tool catalog as JSON
    Tools,
}

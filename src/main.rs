//! Token Metrics MCP Server
//!
//! Crypto analytics tools over stdio, Streamable HTTP and legacy SSE.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use token_metrics_mcp::{
    cli::{Cli, Command},
    config::Config,
    gateway::{Dispatcher, Gateway},
    setup_tracing,
    tools::{ToolRegistry, UpstreamClient},
    transport::StdioServer,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Tools) => print_tools(),
        Some(Command::Serve { port, host }) => run_http(config, port, host).await,
        Some(Command::Stdio) | None => run_stdio(&config).await,
    }
}

fn load_config(cli: &Cli) -> token_metrics_mcp::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(key) = cli.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        config.api_key = Some(key.to_string());
    }
    Ok(config)
}

/// Print the tool catalog
fn print_tools() -> ExitCode {
    let registry = match ToolRegistry::token_metrics() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to build tool registry: {e}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&registry.list()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize tools: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Serve on stdin/stdout until EOF or SIGINT/SIGTERM
async fn run_stdio(config: &Config) -> ExitCode {
    let dispatcher = match ToolRegistry::token_metrics()
        .and_then(|registry| Ok((registry, UpstreamClient::new(&config.upstream)?)))
    {
        Ok((registry, upstream)) => Dispatcher::new(Arc::new(registry), upstream),
        Err(e) => {
            error!("Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    let server = StdioServer::new(dispatcher, config.default_credential());
    let code = match server.run().await {
        Ok(()) => 0,
        Err(e) => {
            error!("stdio transport error: {e}");
            1
        }
    };

    // stdin is read on a blocking thread that cannot be cancelled; exit
    // here instead of letting runtime shutdown wait for the next line
    std::process::exit(code)
}

/// Run the HTTP server
async fn run_http(mut config: Config, port: Option<u16>, host: Option<String>) -> ExitCode {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting Token Metrics MCP server"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}

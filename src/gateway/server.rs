//! HTTP server

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::{Error, Result};

/// Token Metrics MCP HTTP server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Shared handler state
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a new server from configuration
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(AppState::from_config(&config)?);
        info!(
            tools = state.dispatcher.registry().len(),
            upstream = %config.upstream.base_url,
            default_credential = state.default_credential.is_some(),
            "Tool registry ready"
        );
        Ok(Self { config, state })
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// Long-lived SSE streams do not end on their own, so once shutdown
    /// starts the server waits at most `server.shutdown_timeout` for them.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        info!("Token Metrics MCP server listening on http://{local}");
        info!("  Streamable HTTP: POST http://{local}/");
        info!("  Legacy SSE:      GET  http://{local}/sse");
        info!("  Health:          GET  http://{local}/health");

        let (shutdown_tx, mut drain_rx) = broadcast::channel::<()>(1);
        let signal = async move {
            shutdown.await;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        };

        let drain_timeout = self.config.server.shutdown_timeout;
        let drain = async move {
            let _ = drain_rx.recv().await;
            tokio::time::sleep(drain_timeout).await;
        };

        let sweeper = self
            .state
            .sessions
            .spawn_idle_sweeper(self.state.streaming.session_idle_timeout);

        let app = create_router(Arc::clone(&self.state));
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .into_future();

        let outcome = tokio::select! {
            result = server => result.map_err(|e| Error::Internal(e.to_string())),
            () = drain => {
                warn!(
                    timeout = ?drain_timeout,
                    streamable = self.state.sessions.streamable_count(),
                    sse = self.state.sessions.sse_count(),
                    "Open streams outlived the shutdown timeout"
                );
                Ok(())
            }
        };
        sweeper.abort();

        outcome?;
        info!("Server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

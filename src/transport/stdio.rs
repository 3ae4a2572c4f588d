//! Stdio transport
//!
//! Newline-delimited JSON-RPC: one request per line on stdin, one response
//! per line on stdout. The whole process is a single implicit session, so
//! lines are handled strictly in order.

use std::future::Future;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::credentials::Credential;
use crate::error::rpc_codes;
use crate::gateway::{Dispatcher, shutdown_signal};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::{Error, Result};

/// MCP server over a line-oriented byte stream
pub struct StdioServer {
    dispatcher: Dispatcher,
    credential: Option<Credential>,
}

impl StdioServer {
    /// Create a server; `credential` is the process default used for every call
    #[must_use]
    pub fn new(dispatcher: Dispatcher, credential: Option<Credential>) -> Self {
        Self {
            dispatcher,
            credential,
        }
    }

    /// Serve the process's stdin/stdout until EOF or SIGINT/SIGTERM
    pub async fn run(&self) -> Result<()> {
        info!(
            tools = self.dispatcher.registry().len(),
            default_credential = self.credential.is_some(),
            "Token Metrics MCP server running on stdio"
        );
        self.serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_signal(),
        )
        .await
    }

    /// Serve `reader` → `writer` until `reader` hits EOF or `shutdown`
    /// resolves. A request already being handled finishes first.
    pub async fn serve<R, W, F>(&self, reader: R, mut writer: W, shutdown: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = reader.lines();
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let next = tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping");
                    return Ok(());
                }
                next = lines.next_line() => next?,
            };
            let Some(line) = next else {
                break;
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(line).await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        info!("stdin closed, stopping");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Unparsable line on stdin");
                return Some(JsonRpcResponse::from_error(None, &Error::Json(e)));
            }
        };

        if value.is_array() {
            return Some(JsonRpcResponse::error(
                None,
                rpc_codes::INVALID_REQUEST,
                "Invalid Request: batch requests are not supported",
            ));
        }

        let request = match JsonRpcRequest::from_value(value) {
            Ok(request) => request,
            Err(response) => return Some(*response),
        };

        debug!(method = %request.method, "stdio request");
        self.dispatcher
            .handle(request, self.credential.as_ref())
            .await
    }
}

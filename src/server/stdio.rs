//! STDIO transport: one MCP session over stdin/stdout.
//!
//! stdout carries protocol frames only; logging goes to stderr.

use rmcp::ServiceExt;
use tokio_util::sync::CancellationToken;

use crate::error::DuploMcpError;
use crate::server::DuploMcpServer;

/// Serve `server` over stdin/stdout until the client disconnects or
/// `cancel` fires.
pub async fn serve(server: DuploMcpServer, cancel: CancellationToken) -> crate::Result<()> {
    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let running = server
        .serve_with_ct(transport, cancel.clone())
        .await
        .map_err(|e| DuploMcpError::Protocol("stdio".to_string(), format!("{:?}", e)))?;

    tracing::info!("stdio transport initialized, waiting for messages");

    tokio::select! {
        result = running.waiting() => {
            match result {
                Ok(reason) => {
                    tracing::info!(?reason, "stdio transport completed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "stdio transport error");
                    return Err(DuploMcpError::Protocol("stdio".to_string(), e.to_string()));
                }
            }
        }
        _ = cancel.cancelled() => {
            tracing::info!("stdio transport cancelled");
        }
    }

    Ok(())
}

//! Streamable HTTP transport.
//!
//! `/health` answers liveness probes, custom routes are looked up in the
//! current tool box on every request, and `/mcp` goes to rmcp's
//! `StreamableHttpService`. Any other path is a 404.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::error::DuploMcpError;
use crate::server::DuploMcpServer;
use crate::server::handler::SERVER_NAME;

/// Path of the MCP endpoint.
pub const MCP_PATH: &str = "/mcp";

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": SERVER_NAME }))
}

fn is_mcp_path(path: &str) -> bool {
    path == MCP_PATH || path.starts_with("/mcp/")
}

/// Build the HTTP router for `server`.
pub fn router(server: DuploMcpServer, cancel: CancellationToken) -> Router {
    let session_manager = Arc::new(LocalSessionManager::default());
    let http_config = StreamableHttpServerConfig {
        cancellation_token: cancel,
        ..Default::default()
    };
    let server_for_factory = server.clone();
    let mcp_service = StreamableHttpService::new(
        move || Ok(server_for_factory.clone()),
        session_manager,
        http_config,
    );

    Router::new()
        .route("/health", get(health))
        .fallback(move |req: Request<Body>| {
            let server = server.clone();
            let svc = mcp_service.clone();
            async move { dispatch(server, svc, req).await }
        })
}

async fn dispatch(
    server: DuploMcpServer,
    svc: StreamableHttpService<DuploMcpServer, LocalSessionManager>,
    req: Request<Body>,
) -> Response {
    let toolbox = server.toolbox().await;
    if let Some(route) = toolbox.route(req.method(), req.uri().path()) {
        let handler = route.handler.clone();
        let ctx = route.ctx.clone();
        return handler(ctx, req).await;
    }

    if is_mcp_path(req.uri().path()) {
        let Ok(response) = svc.oneshot(req).await;
        return response.into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}

/// Bind `host:port` and serve until `cancel` fires.
pub async fn serve(
    server: DuploMcpServer,
    host: &str,
    port: u16,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let app = router(server, cancel.clone());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            DuploMcpError::Protocol("http".to_string(), format!("failed to bind {}: {}", addr, e))
        })?;

    tracing::info!("Server at http://{}:{}{}", host, port, MCP_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| DuploMcpError::Protocol("http".to_string(), e.to_string()))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

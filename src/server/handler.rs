//! DuploMcpServer: rmcp ServerHandler backed by a ToolBox.
//!
//! The tool box sits behind an `Arc<RwLock<Arc<ToolBox>>>`. Catalog reloads
//! swap the inner Arc while every session clone shares the outer one, so all
//! sessions see the new tools on their next request.
//!
//! Connected peers are kept so reloads can broadcast list-changed
//! notifications.

use std::sync::Arc;

use rmcp::ErrorData as McpError;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParams, ReadResourceRequestParams, ReadResourceResult, ResourceContents,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::{NotificationContext, Peer, RequestContext, RoleServer};
use tokio::sync::RwLock;

use crate::error::DuploMcpError;
use crate::toolbox::ToolBox;

pub const SERVER_NAME: &str = "duplocloud-mcp";

pub type ToolBoxHandle = Arc<RwLock<Arc<ToolBox>>>;
pub type PeersHandle = Arc<tokio::sync::Mutex<Vec<Peer<RoleServer>>>>;

/// MCP server backed by a ToolBox.
///
/// `StreamableHttpService` calls its factory once per session; every clone
/// shares the same handles.
#[derive(Clone)]
pub struct DuploMcpServer {
    toolbox: ToolBoxHandle,
    /// Stale peers are pruned when a notification fails.
    peers: PeersHandle,
}

impl DuploMcpServer {
    pub fn new(toolbox: ToolBox) -> Self {
        Self {
            toolbox: Arc::new(RwLock::new(Arc::new(toolbox))),
            peers: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    /// Handle used by the reload task to swap the inner tool box.
    pub fn toolbox_handle(&self) -> ToolBoxHandle {
        self.toolbox.clone()
    }

    pub fn peers_handle(&self) -> PeersHandle {
        self.peers.clone()
    }

    /// The current tool box.
    pub async fn toolbox(&self) -> Arc<ToolBox> {
        self.toolbox.read().await.clone()
    }
}

/// Map a library error onto the MCP error it surfaces as.
pub fn to_mcp_error(error: DuploMcpError) -> McpError {
    match error {
        DuploMcpError::InvalidArguments(..) | DuploMcpError::UnknownTool(_) => {
            McpError::invalid_params(error.to_string(), None)
        }
        other => McpError::internal_error(other.to_string(), None),
    }
}

impl ServerHandler for DuploMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "DuploCloud MCP server: runs duploctl resource commands as tools.".into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_resources_list_changed()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let toolbox = self.toolbox().await;
        Ok(ListToolsResult {
            tools: toolbox.list_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let toolbox = self.toolbox().await;
        toolbox
            .call_tool(&request.name, request.arguments)
            .await
            .map_err(to_mcp_error)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let toolbox = self.toolbox().await;
        Ok(ListResourcesResult {
            resources: toolbox.list_resources(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParams { meta: _, uri }: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let toolbox = self.toolbox().await;
        match toolbox.read_resource(&uri).await {
            Ok(text) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(text, uri)],
            }),
            Err(DuploMcpError::Protocol(..)) => Err(McpError::resource_not_found(
                format!("no resource at '{}'", uri),
                None,
            )),
            Err(e) => Err(to_mcp_error(e)),
        }
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        tracing::info!("MCP client initialized");
        self.peers.lock().await.push(context.peer.clone());
    }
}

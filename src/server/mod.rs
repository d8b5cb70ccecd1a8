//! Server lifecycle: tool registration, custom tool binding and transports.
//!
//! [`DuploCloudMcp`] turns settings, a catalog and a duploctl client into a
//! [`ToolBox`], then serves it over the configured transport.

pub mod handler;
pub mod hot_reload;
pub mod http;
pub mod stdio;

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::{ServerSettings, ToolMode, Transport};
use crate::ctx::{Ctx, CustomRegistry};
use crate::duplo::Dispatch;
use crate::filter::NameFilter;
use crate::toolbox::{RegisteredRoute, ToolBox, ToolTarget};
use crate::tools::ToolRegistrar;

pub use handler::DuploMcpServer;

/// Coordinates registration and serving for one server instance.
pub struct DuploCloudMcp {
    settings: ServerSettings,
    resource_filter: NameFilter,
    command_filter: NameFilter,
    client: Arc<dyn Dispatch>,
    catalog: Arc<Catalog>,
    /// Registration drains a copy, so the same entries apply again on reload.
    custom: CustomRegistry,
    environment: Map<String, Value>,
    /// Resources that passed the resource filter, sorted.
    resources: Vec<String>,
    toolbox: ToolBox,
}

impl DuploCloudMcp {
    /// Compiles both filters up front; a bad pattern fails here.
    pub fn new(
        settings: ServerSettings,
        client: Arc<dyn Dispatch>,
        catalog: Arc<Catalog>,
    ) -> crate::Result<Self> {
        let resource_filter = settings.resource_filter()?;
        let command_filter = settings.command_filter()?;
        Ok(Self {
            settings,
            resource_filter,
            command_filter,
            toolbox: ToolBox::new(client.clone()),
            client,
            catalog,
            custom: CustomRegistry::builtin(),
            environment: Map::new(),
            resources: Vec::new(),
        })
    }

    /// duploctl's environment summary, shown at startup and by `config`.
    pub fn with_environment(mut self, environment: Map<String, Value>) -> Self {
        self.environment = environment;
        self
    }

    /// Replace the built-in custom tools and routes.
    pub fn with_custom(mut self, custom: CustomRegistry) -> Self {
        self.custom = custom;
        self
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn toolbox(&self) -> &ToolBox {
        &self.toolbox
    }

    pub fn into_toolbox(self) -> ToolBox {
        self.toolbox
    }

    /// Register tools for `resource_names`, or every catalog resource when
    /// `None`, after applying the resource filter.
    pub fn register_tools(&mut self, resource_names: Option<Vec<String>>) {
        let names = resource_names.unwrap_or_else(|| self.catalog.resource_names());

        let (mut filtered, mut skipped): (Vec<String>, Vec<String>) = names
            .into_iter()
            .partition(|name| self.resource_filter.matches(name));
        skipped.sort();
        skipped.dedup();
        for name in &skipped {
            tracing::debug!(resource = %name, "Skipping resource '{}' (resource filter)", name);
        }

        filtered.sort();
        filtered.dedup();
        tracing::info!("Registering tools for: {}", filtered.join(", "));
        self.resources = filtered;

        let mode = self.settings.tool_mode;
        match mode {
            ToolMode::Compact => {
                tracing::info!(
                    "Compact mode: tools provided by custom tools (execute, explain, resources)"
                );
            }
            ToolMode::Expanded => {
                ToolRegistrar::new(&self.catalog, &self.command_filter)
                    .register(&mut self.toolbox, &self.resources);
            }
        }

        self.register_custom(mode);
    }

    /// Bind the custom tools and routes for `mode` to a shared context and
    /// add them to the tool box.
    pub fn register_custom(&mut self, mode: ToolMode) {
        let mut pending = self.custom.clone();
        let tools = pending.drain_tools(mode);
        let routes = pending.drain_routes(mode);

        let mut tool_names = self.toolbox.tool_names();
        tool_names.extend(tools.iter().map(|t| t.name.clone()));
        tool_names.sort();
        tool_names.dedup();

        let ctx = Arc::new(Ctx {
            client: self.client.clone(),
            catalog: self.catalog.clone(),
            config: self.settings.mcp_settings(),
            tools: tool_names,
            resources: self.resources.clone(),
            environment: self.environment.clone(),
        });

        for custom in tools {
            tracing::info!("    {} (custom)", custom.name);
            let tool = rmcp::model::Tool {
                name: custom.name.into(),
                title: None,
                description: custom.description.map(Into::into),
                input_schema: Arc::new(custom.input_schema),
                output_schema: None,
                annotations: None,
                icons: None,
                meta: None,
            };
            self.toolbox.insert_tool(
                tool,
                ToolTarget::Custom {
                    handler: custom.handler,
                    ctx: ctx.clone(),
                },
            );
        }

        for route in routes {
            tracing::info!("    route {} (custom)", route.path);
            self.toolbox.insert_route(RegisteredRoute {
                path: route.path,
                method: route.method,
                handler: route.handler,
                ctx: ctx.clone(),
            });
        }
    }

    /// Log the startup summary and serve until `cancel` fires or the
    /// transport closes.
    ///
    /// With a catalog file configured, the file is watched and the tool box
    /// rebuilt whenever it changes.
    pub async fn start(self, cancel: CancellationToken) -> crate::Result<()> {
        match serde_yaml::to_string(&self.environment) {
            Ok(yaml) => tracing::info!("DuploCloud Environment Info:\n{}", yaml.trim_end()),
            Err(e) => tracing::warn!(error = %e, "could not render environment info"),
        }
        tracing::info!("Tool mode: {}", self.settings.tool_mode);
        if !self.resource_filter.is_default() {
            tracing::info!("Resource filter: {}", self.resource_filter.pattern());
        }
        if !self.command_filter.is_default() {
            tracing::info!("Command filter: {}", self.command_filter.pattern());
        }
        tracing::info!("Starting MCP server with transport: {}", self.settings.transport);

        let reload = self.settings.catalog.clone().map(|path| hot_reload::ReloadSource {
            path,
            settings: self.settings.clone(),
            client: self.client.clone(),
            custom: self.custom.clone(),
            environment: self.environment.clone(),
        });
        let settings = self.settings.clone();
        let server = DuploMcpServer::new(self.into_toolbox());

        if let Some(source) = reload {
            tokio::spawn(hot_reload::run_hot_reload(
                source,
                server.toolbox_handle(),
                server.peers_handle(),
                cancel.child_token(),
            ));
        }

        match settings.transport {
            Transport::Http => http::serve(server, &settings.host, settings.port, cancel).await,
            Transport::Stdio => stdio::serve(server, cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::tenant_catalog;
    use crate::ctx::{CustomRoute, CustomTool, route_handler, tool_handler};
    use crate::duplo::testing::RecordingDispatch;
    use axum::http::Method;
    use axum::response::IntoResponse;
    use serde_json::json;

    fn settings(mode: ToolMode) -> ServerSettings {
        ServerSettings {
            tool_mode: mode,
            ..Default::default()
        }
    }

    fn server(settings: ServerSettings) -> DuploCloudMcp {
        DuploCloudMcp::new(
            settings,
            Arc::new(RecordingDispatch::new()),
            Arc::new(tenant_catalog()),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_filter_fails_construction() {
        let result = DuploCloudMcp::new(
            ServerSettings {
                resource_filter: "serv(".to_string(),
                ..Default::default()
            },
            Arc::new(RecordingDispatch::new()),
            Arc::new(tenant_catalog()),
        );
        assert!(matches!(
            result,
            Err(crate::DuploMcpError::InvalidFilter(_, _))
        ));
    }

    #[test]
    fn test_expanded_registers_catalog_tools_and_config() {
        let mut mcp = server(settings(ToolMode::Expanded));
        mcp.register_tools(None);

        assert_eq!(mcp.resources(), ["service", "tenant"]);
        let names = mcp.toolbox().tool_names();
        assert!(names.contains(&"tenant_list".to_string()));
        assert!(names.contains(&"service_logs".to_string()));
        assert!(names.contains(&"config".to_string()));
        assert!(!names.contains(&"execute".to_string()));
        assert_eq!(mcp.toolbox().routes().len(), 1);
    }

    #[test]
    fn test_resource_filter_applied() {
        let mut mcp = server(ServerSettings {
            resource_filter: "tenant".to_string(),
            ..Default::default()
        });
        mcp.register_tools(Some(vec![
            "tenant".to_string(),
            "service".to_string(),
            "tenant".to_string(),
        ]));

        assert_eq!(mcp.resources(), ["tenant"]);
        assert!(
            mcp.toolbox()
                .tool_names()
                .iter()
                .all(|n| !n.starts_with("service_"))
        );
    }

    #[test]
    fn test_compact_registers_only_custom_tools() {
        let mut mcp = server(settings(ToolMode::Compact));
        mcp.register_tools(None);

        assert_eq!(
            mcp.toolbox().tool_names(),
            vec!["config", "execute", "explain", "resources"]
        );
    }

    #[tokio::test]
    async fn test_custom_ctx_lists_every_tool() {
        let mut mcp = server(settings(ToolMode::Compact));
        mcp.register_tools(None);

        let result = mcp.toolbox().call_tool("config", None).await.unwrap();
        let text = result.content[0]
            .as_text()
            .map(|t| t.text.clone())
            .unwrap_or_default();
        let config: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            config["Tools"],
            json!(["config", "execute", "explain", "resources"])
        );
        assert_eq!(config["AvailableResources"], json!(["service", "tenant"]));
        assert_eq!(config["MCP"]["tool_mode"], "compact");
    }

    #[test]
    fn test_user_registry_is_mode_filtered() {
        let mut registry = CustomRegistry::new();
        registry
            .tool(
                CustomTool::new(
                    "whoami",
                    tool_handler(|_, _| async { Ok(json!("me")) }),
                )
                .mode(ToolMode::Compact),
            )
            .route(
                CustomRoute::new(
                    "/whoami",
                    Method::GET,
                    route_handler(|_, _| async { "me".into_response() }),
                )
                .mode(ToolMode::Compact),
            );

        let mut expanded = server(settings(ToolMode::Expanded)).with_custom(registry.clone());
        expanded.register_tools(None);
        assert!(!expanded.toolbox().tool_names().contains(&"whoami".to_string()));
        assert!(expanded.toolbox().routes().is_empty());

        let mut compact = server(settings(ToolMode::Compact)).with_custom(registry);
        compact.register_tools(None);
        assert_eq!(compact.toolbox().tool_names(), vec!["whoami"]);
        assert!(compact.toolbox().route(&Method::GET, "/whoami").is_some());
    }

    #[test]
    fn test_register_custom_twice_keeps_single_entries() {
        let mut mcp = server(settings(ToolMode::Expanded));
        mcp.register_tools(None);
        let count = mcp.toolbox().tool_count();
        mcp.register_custom(ToolMode::Expanded);
        assert_eq!(mcp.toolbox().tool_count(), count);
        assert_eq!(mcp.toolbox().routes().len(), 1);
    }
}

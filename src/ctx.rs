//! Runtime context and the registry of custom tools and routes.
//!
//! Custom tools and HTTP routes are registered on a [`CustomRegistry`] before
//! the server starts. At registration time the server drains the entries that
//! apply to the active [`ToolMode`] and binds each one to a shared [`Ctx`].
//! Handlers receive the context as their first argument; it never appears in
//! a tool's input schema.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use futures::future::BoxFuture;
use rmcp::model::JsonObject;
use serde_json::{Map, Value, json};

use crate::catalog::Catalog;
use crate::config::{McpSettings, ToolMode};
use crate::duplo::Dispatch;

/// Everything a custom handler can see about the running server.
#[derive(Clone)]
pub struct Ctx {
    pub client: Arc<dyn Dispatch>,
    pub catalog: Arc<Catalog>,
    pub config: McpSettings,
    /// Names of every registered tool, sorted.
    pub tools: Vec<String>,
    /// Resource names that passed the resource filter, sorted.
    pub resources: Vec<String>,
    /// duploctl's environment summary.
    pub environment: Map<String, Value>,
}

impl Ctx {
    /// Context with an empty catalog, default settings and no tools.
    pub fn new(client: Arc<dyn Dispatch>) -> Self {
        Self {
            client,
            catalog: Arc::new(Catalog::default()),
            config: McpSettings::default(),
            tools: Vec::new(),
            resources: Vec::new(),
            environment: Map::new(),
        }
    }
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

/// Custom tool handler. A string result is returned as text, anything else
/// as JSON.
pub type ToolHandler =
    Arc<dyn Fn(Arc<Ctx>, JsonObject) -> BoxFuture<'static, crate::Result<Value>> + Send + Sync>;

/// Custom HTTP route handler.
pub type RouteHandler =
    Arc<dyn Fn(Arc<Ctx>, Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function as a [`ToolHandler`].
pub fn tool_handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Arc<Ctx>, JsonObject) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx, args| Box::pin(f(ctx, args)))
}

/// Wrap an async function as a [`RouteHandler`].
pub fn route_handler<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(Arc<Ctx>, Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx, req| Box::pin(f(ctx, req)))
}

/// Input schema for a tool that takes no arguments.
pub fn empty_schema() -> JsonObject {
    match json!({ "type": "object", "properties": {} }) {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

/// A tool registered outside the duploctl catalog.
#[derive(Clone)]
pub struct CustomTool {
    pub name: String,
    pub description: Option<String>,
    /// `None` registers the tool in every mode.
    pub mode: Option<ToolMode>,
    pub input_schema: JsonObject,
    pub handler: ToolHandler,
}

impl CustomTool {
    pub fn new(name: impl Into<String>, handler: ToolHandler) -> Self {
        Self {
            name: name.into(),
            description: None,
            mode: None,
            input_schema: empty_schema(),
            handler,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.trim().is_empty()).then_some(description);
        self
    }

    pub fn mode(mut self, mode: ToolMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn input_schema(mut self, schema: JsonObject) -> Self {
        self.input_schema = schema;
        self
    }
}

impl std::fmt::Debug for CustomTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// An HTTP route registered alongside the MCP endpoint.
#[derive(Clone)]
pub struct CustomRoute {
    pub path: String,
    pub method: Method,
    pub mode: Option<ToolMode>,
    pub handler: RouteHandler,
}

impl CustomRoute {
    pub fn new(path: impl Into<String>, method: Method, handler: RouteHandler) -> Self {
        Self {
            path: path.into(),
            method,
            mode: None,
            handler,
        }
    }

    pub fn mode(mut self, mode: ToolMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

impl std::fmt::Debug for CustomRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomRoute")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn applies(entry: Option<ToolMode>, mode: ToolMode) -> bool {
    entry.is_none_or(|m| m == mode)
}

/// Pending custom tools and routes.
#[derive(Debug, Clone, Default)]
pub struct CustomRegistry {
    tools: Vec<CustomTool>,
    routes: Vec<CustomRoute>,
}

impl CustomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The server's own tools and routes: `config` and `/config` in every
    /// mode, plus the compact tools.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::config_display::register(&mut registry);
        crate::compact::register(&mut registry);
        registry
    }

    pub fn tool(&mut self, tool: CustomTool) -> &mut Self {
        self.tools.push(tool);
        self
    }

    pub fn route(&mut self, route: CustomRoute) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Remove and return the tools that apply to `mode`. Tools for another
    /// mode stay registered.
    pub fn drain_tools(&mut self, mode: ToolMode) -> Vec<CustomTool> {
        let (matched, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tools)
            .into_iter()
            .partition(|t| applies(t.mode, mode));
        self.tools = rest;
        matched
    }

    /// Remove and return the routes that apply to `mode`.
    pub fn drain_routes(&mut self, mode: ToolMode) -> Vec<CustomRoute> {
        let (matched, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.routes)
            .into_iter()
            .partition(|r| applies(r.mode, mode));
        self.routes = rest;
        matched
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplo::testing::RecordingDispatch;
    use axum::response::IntoResponse;

    fn echo_tool(name: &str) -> CustomTool {
        CustomTool::new(
            name,
            tool_handler(|_ctx, args| async move { Ok(Value::Object(args)) }),
        )
    }

    fn ok_route(path: &str) -> CustomRoute {
        CustomRoute::new(
            path,
            Method::GET,
            route_handler(|_ctx, _req| async move { "ok".into_response() }),
        )
    }

    #[test]
    fn test_ctx_new_is_empty() {
        let ctx = Ctx::new(Arc::new(RecordingDispatch::new()));
        assert!(ctx.tools.is_empty());
        assert!(ctx.resources.is_empty());
        assert!(ctx.environment.is_empty());
        assert!(ctx.catalog.resources.is_empty());
        assert_eq!(ctx.config, McpSettings::default());
    }

    #[test]
    fn test_custom_tool_defaults() {
        let tool = echo_tool("ping");
        assert_eq!(tool.name, "ping");
        assert!(tool.description.is_none());
        assert!(tool.mode.is_none());
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_blank_description_is_none() {
        let tool = echo_tool("ping").description("   ");
        assert!(tool.description.is_none());
        let tool = echo_tool("ping").description("Ping the server.");
        assert_eq!(tool.description.as_deref(), Some("Ping the server."));
    }

    #[test]
    fn test_drain_tools_filters_by_mode() {
        let mut registry = CustomRegistry::new();
        registry
            .tool(echo_tool("always"))
            .tool(echo_tool("compact_only").mode(ToolMode::Compact))
            .tool(echo_tool("expanded_only").mode(ToolMode::Expanded));

        let names: Vec<String> = registry
            .drain_tools(ToolMode::Expanded)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["always", "expanded_only"]);

        let names: Vec<String> = registry
            .drain_tools(ToolMode::Compact)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["compact_only"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_twice_returns_nothing() {
        let mut registry = CustomRegistry::new();
        registry.tool(echo_tool("always")).route(ok_route("/status"));

        assert_eq!(registry.drain_tools(ToolMode::Compact).len(), 1);
        assert_eq!(registry.drain_routes(ToolMode::Compact).len(), 1);
        assert!(registry.drain_tools(ToolMode::Compact).is_empty());
        assert!(registry.drain_routes(ToolMode::Compact).is_empty());
    }

    #[test]
    fn test_drain_routes_filters_by_mode() {
        let mut registry = CustomRegistry::new();
        registry
            .route(ok_route("/always"))
            .route(ok_route("/compact").mode(ToolMode::Compact));

        let paths: Vec<String> = registry
            .drain_routes(ToolMode::Expanded)
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["/always"]);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_builtin_registry() {
        let mut registry = CustomRegistry::builtin();

        let expanded: Vec<String> = registry
            .clone()
            .drain_tools(ToolMode::Expanded)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(expanded, vec!["config"]);

        let mut compact: Vec<String> = registry
            .drain_tools(ToolMode::Compact)
            .into_iter()
            .map(|t| t.name)
            .collect();
        compact.sort();
        assert_eq!(compact, vec!["config", "execute", "explain", "resources"]);

        let routes = registry.drain_routes(ToolMode::Expanded);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/config");
        assert_eq!(routes[0].method, Method::GET);
    }

    #[tokio::test]
    async fn test_handler_receives_ctx() {
        let tool = CustomTool::new(
            "resources",
            tool_handler(|ctx, _args| async move { Ok(json!(ctx.resources)) }),
        );
        let mut ctx = Ctx::new(Arc::new(RecordingDispatch::new()));
        ctx.resources = vec!["service".to_string(), "tenant".to_string()];

        let result = (tool.handler)(Arc::new(ctx), JsonObject::new()).await.unwrap();
        assert_eq!(result, json!(["service", "tenant"]));
    }
}

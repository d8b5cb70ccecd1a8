//! ToolBox: the registered tools, read resources and custom routes that the
//! MCP handler and HTTP router serve.
//!
//! A ToolBox is immutable once built. Catalog reloads build a new one and
//! swap it in behind the server's `Arc<RwLock<Arc<ToolBox>>>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::Method;
use rmcp::model::{
    AnnotateAble, CallToolResult, Content, JsonObject, RawResource, Resource, Tool,
};

use crate::ctx::{Ctx, RouteHandler, ToolHandler};
use crate::duplo::{Dispatch, DispatchOutput};
use crate::error::DuploMcpError;
use crate::tools::CommandBinding;

/// What runs when a tool is called.
#[derive(Clone)]
pub enum ToolTarget {
    /// A duploctl command.
    Command(CommandBinding),
    /// A custom handler bound to its context.
    Custom { handler: ToolHandler, ctx: Arc<Ctx> },
}

impl std::fmt::Debug for ToolTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(binding) => f.debug_tuple("Command").field(binding).finish(),
            Self::Custom { .. } => f.write_str("Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub tool: Tool,
    pub target: ToolTarget,
}

/// A read-only command exposed as `duplo://{resource}/{command}`.
#[derive(Debug, Clone)]
pub struct ReadResource {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub binding: CommandBinding,
}

/// A custom HTTP route bound to its context.
#[derive(Clone)]
pub struct RegisteredRoute {
    pub path: String,
    pub method: Method,
    pub handler: RouteHandler,
    pub ctx: Arc<Ctx>,
}

pub struct ToolBox {
    client: Arc<dyn Dispatch>,
    tools: BTreeMap<String, RegisteredTool>,
    resources: BTreeMap<String, ReadResource>,
    routes: Vec<RegisteredRoute>,
}

impl ToolBox {
    pub fn new(client: Arc<dyn Dispatch>) -> Self {
        Self {
            client,
            tools: BTreeMap::new(),
            resources: BTreeMap::new(),
            routes: Vec::new(),
        }
    }

    pub fn client(&self) -> Arc<dyn Dispatch> {
        self.client.clone()
    }

    /// Add a tool. A later tool with the same name replaces the earlier one.
    pub fn insert_tool(&mut self, tool: Tool, target: ToolTarget) {
        let name = tool.name.to_string();
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "tool registered twice, keeping the last registration");
        }
        self.tools.insert(name, RegisteredTool { tool, target });
    }

    pub fn insert_resource(&mut self, resource: ReadResource) {
        self.resources.insert(resource.uri.clone(), resource);
    }

    pub fn insert_route(&mut self, route: RegisteredRoute) {
        self.routes
            .retain(|r| !(r.path == route.path && r.method == route.method));
        self.routes.push(route);
    }

    /// Sorted tool names.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.values().map(|t| t.tool.clone()).collect()
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources
            .values()
            .map(|r| {
                let mut raw = RawResource::new(r.uri.clone(), r.name.clone());
                if !r.description.is_empty() {
                    raw.description = Some(r.description.clone());
                }
                raw.mime_type = Some("application/json".to_string());
                raw.no_annotation()
            })
            .collect()
    }

    /// The route registered for `method` and `path`.
    pub fn route(&self, method: &Method, path: &str) -> Option<&RegisteredRoute> {
        self.routes
            .iter()
            .find(|r| &r.method == method && r.path == path)
    }

    pub fn routes(&self) -> &[RegisteredRoute] {
        &self.routes
    }

    /// Call a tool by name.
    ///
    /// duploctl output that parses as JSON is returned as JSON content,
    /// anything else as text. Any non-zero exit marks the result as an
    /// error, with stderr as the message (stdout when stderr is empty).
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> crate::Result<CallToolResult> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| DuploMcpError::UnknownTool(name.to_string()))?;

        match &registered.target {
            ToolTarget::Command(binding) => {
                let invocation = binding.invocation(arguments)?;
                let output = self.client.dispatch(invocation).await?;
                command_result(name, output)
            }
            ToolTarget::Custom { handler, ctx } => {
                let value = handler(ctx.clone(), arguments.unwrap_or_default()).await?;
                let content = match value {
                    serde_json::Value::String(text) => Content::text(text),
                    other => Content::json(other).map_err(|e| {
                        DuploMcpError::Protocol(name.to_string(), format!("JSON content error: {}", e))
                    })?,
                };
                Ok(CallToolResult {
                    content: vec![content],
                    is_error: Some(false),
                    structured_content: None,
                    meta: None,
                })
            }
        }
    }

    /// Run the command behind a read resource and return its output.
    pub async fn read_resource(&self, uri: &str) -> crate::Result<String> {
        let resource = self.resources.get(uri).ok_or_else(|| {
            DuploMcpError::Protocol(uri.to_string(), "no such resource".to_string())
        })?;
        let invocation = resource.binding.invocation(None)?;
        let output = self.client.dispatch(invocation).await?;
        if !output.success() {
            return Err(DuploMcpError::Dispatch(
                resource.name.clone(),
                output.failure_message(),
            ));
        }
        Ok(output.stdout)
    }
}

fn command_result(name: &str, output: DispatchOutput) -> crate::Result<CallToolResult> {
    let is_error = !output.success();
    let content = if is_error {
        Content::text(output.failure_message())
    } else if let Ok(json) = serde_json::from_str::<serde_json::Value>(&output.stdout) {
        Content::json(json).map_err(|e| {
            DuploMcpError::Protocol(name.to_string(), format!("JSON content error: {}", e))
        })?
    } else {
        Content::text(output.stdout)
    };

    Ok(CallToolResult {
        content: vec![content],
        is_error: Some(is_error),
        structured_content: None,
        meta: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::tenant_catalog;
    use crate::ctx::tool_handler;
    use crate::duplo::testing::RecordingDispatch;
    use crate::filter::NameFilter;
    use crate::tools::ToolRegistrar;
    use serde_json::json;

    fn tenant_toolbox(dispatch: Arc<RecordingDispatch>) -> ToolBox {
        let catalog = tenant_catalog();
        let filter = NameFilter::default();
        let mut tb = ToolBox::new(dispatch);
        ToolRegistrar::new(&catalog, &filter)
            .register(&mut tb, &["tenant".to_string(), "service".to_string()]);
        tb
    }

    fn text_of(result: &CallToolResult) -> String {
        result.content[0]
            .as_text()
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_call_dispatches_invocation() {
        let dispatch = Arc::new(RecordingDispatch::new());
        let tb = tenant_toolbox(dispatch.clone());

        let result = tb
            .call_tool("tenant_find", json!({"name": "dev01"}).as_object().cloned())
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(text_of(&result), "ok");

        let calls = dispatch.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argv(), vec!["tenant", "find", "dev01"]);
    }

    #[tokio::test]
    async fn test_json_output_returned_as_json() {
        let dispatch = Arc::new(RecordingDispatch::with_output(DispatchOutput {
            stdout: r#"[{"AccountName": "dev01"}]"#.to_string(),
            ..Default::default()
        }));
        let tb = tenant_toolbox(dispatch);

        let result = tb.call_tool("tenant_list", None).await.unwrap();
        let text = text_of(&result);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{"AccountName": "dev01"}]));
    }

    #[tokio::test]
    async fn test_failed_command_is_error() {
        let dispatch = Arc::new(RecordingDispatch::with_output(DispatchOutput {
            stderr: "tenant not found".to_string(),
            exit_code: 1,
            ..Default::default()
        }));
        let tb = tenant_toolbox(dispatch);

        let result = tb
            .call_tool("tenant_find", json!({"name": "nope"}).as_object().cloned())
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(text_of(&result), "tenant not found");
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_stdout_only_is_error() {
        let dispatch = Arc::new(RecordingDispatch::with_output(DispatchOutput {
            stdout: r#"{"message":"tenant not found"}"#.to_string(),
            exit_code: 1,
            ..Default::default()
        }));
        let tb = tenant_toolbox(dispatch);

        let result = tb.call_tool("tenant_list", None).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(text_of(&result), r#"{"message":"tenant not found"}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let tb = tenant_toolbox(Arc::new(RecordingDispatch::new()));
        let result = tb.call_tool("lambda_list", None).await;
        assert!(matches!(result, Err(DuploMcpError::UnknownTool(t)) if t == "lambda_list"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_do_not_dispatch() {
        let dispatch = Arc::new(RecordingDispatch::new());
        let tb = tenant_toolbox(dispatch.clone());
        let result = tb.call_tool("tenant_find", None).await;
        assert!(matches!(result, Err(DuploMcpError::InvalidArguments(_, _))));
        assert!(dispatch.calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_tool_gets_ctx() {
        let dispatch = Arc::new(RecordingDispatch::new());
        let mut tb = ToolBox::new(dispatch.clone());
        let mut ctx = Ctx::new(dispatch);
        ctx.resources = vec!["tenant".to_string()];

        let tool = Tool {
            name: "resources".into(),
            title: None,
            description: None,
            input_schema: Arc::new(crate::ctx::empty_schema()),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        };
        tb.insert_tool(
            tool,
            ToolTarget::Custom {
                handler: tool_handler(|ctx, _| async move { Ok(json!({"resources": ctx.resources})) }),
                ctx: Arc::new(ctx),
            },
        );

        let result = tb.call_tool("resources", None).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(parsed, json!({"resources": ["tenant"]}));
    }

    #[tokio::test]
    async fn test_read_resource() {
        let dispatch = Arc::new(RecordingDispatch::new());
        let tb = tenant_toolbox(dispatch.clone());

        let text = tb.read_resource("duplo://tenant/list").await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(dispatch.calls()[0].argv(), vec!["tenant", "list"]);

        assert!(matches!(
            tb.read_resource("duplo://tenant/find").await,
            Err(DuploMcpError::Protocol(_, _))
        ));
    }
}

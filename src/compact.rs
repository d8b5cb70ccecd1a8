//! Compact-mode tools.
//!
//! Instead of one tool per resource and command, compact mode registers
//! three generic tools. A client lists the allowed `resources`, asks
//! `explain` for a command's arguments and body model, then runs it with
//! `execute`.

use std::sync::Arc;

use rmcp::model::JsonObject;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::catalog::ArgSpec;
use crate::config::ToolMode;
use crate::ctx::{CustomRegistry, CustomTool, Ctx, tool_handler};
use crate::duplo::Invocation;
use crate::error::DuploMcpError;
use crate::filter::NameFilter;
use crate::tools::schema::describe_model_fields;
use crate::tools::template::{first_line, render_doc};

const RESOURCES_DOC: &str = "List available DuploCloud resources.

Returns the names of all resources that match the server's resource filter. \
Use these names with the explain and execute tools.";

const EXPLAIN_DOC: &str = "Explain a DuploCloud resource's commands, arguments, and body schema.

Without a command, returns all commands available on the resource. With a \
command, returns detailed argument info including body model fields when the \
command takes a model. Use this to understand what arguments the execute tool \
expects for a given resource and command.";

const EXECUTE_DOC: &str = "Execute a DuploCloud command. Use the explain tool first to understand \
what arguments a command expects.

Runs duploctl with the given resource and command. Commands that accept a \
body receive it as their input file.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExplainArgs {
    resource: String,
    #[serde(default)]
    command: Option<String>,
}

/// Arguments of the `execute` tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecuteArgs {
    pub resource: String,
    pub command: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub body: Option<Map<String, Value>>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub wait: bool,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: JsonObject) -> crate::Result<T> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| DuploMcpError::InvalidArguments(tool.to_string(), e.to_string()))
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn explain_schema() -> JsonObject {
    object(json!({
        "type": "object",
        "properties": {
            "resource": {
                "type": "string",
                "description": "The resource name (e.g. \"tenant\", \"service\")."
            },
            "command": {
                "type": "string",
                "description": "Optional specific command to get detailed argument info for."
            }
        },
        "required": ["resource"],
        "additionalProperties": false
    }))
}

fn execute_schema() -> JsonObject {
    object(json!({
        "type": "object",
        "properties": {
            "resource": {
                "type": "string",
                "description": "The resource kind (e.g. \"tenant\", \"service\", \"asg\")."
            },
            "command": {
                "type": "string",
                "description": "The command to run (e.g. \"create\", \"find\", \"list\", \"update\")."
            },
            "name": {
                "type": "string",
                "description": "The resource name. Optional even when the command requires it because some commands infer the name from the body."
            },
            "args": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Additional positional arguments. Most commands do not need this; use explain to check."
            },
            "body": {
                "type": "object",
                "description": "Payload for create/update commands. Use explain to see the expected model fields."
            },
            "query": {
                "type": "string",
                "description": "A JMESPath expression to filter the command output."
            },
            "output": {
                "type": "string",
                "enum": ["json", "yaml", "string"],
                "description": "Output format override."
            },
            "wait": {
                "type": "boolean",
                "default": false,
                "description": "Wait for the operation to complete before returning."
            }
        },
        "required": ["resource", "command"],
        "additionalProperties": false
    }))
}

pub(crate) fn register(registry: &mut CustomRegistry) {
    registry
        .tool(
            CustomTool::new("resources", tool_handler(resources_tool))
                .description(RESOURCES_DOC)
                .mode(ToolMode::Compact),
        )
        .tool(
            CustomTool::new("explain", tool_handler(explain_tool))
                .description(EXPLAIN_DOC)
                .mode(ToolMode::Compact)
                .input_schema(explain_schema()),
        )
        .tool(
            CustomTool::new("execute", tool_handler(execute_tool))
                .description(EXECUTE_DOC)
                .mode(ToolMode::Compact)
                .input_schema(execute_schema()),
        );
}

async fn resources_tool(ctx: Arc<Ctx>, _args: JsonObject) -> crate::Result<Value> {
    Ok(resources(&ctx))
}

async fn explain_tool(ctx: Arc<Ctx>, args: JsonObject) -> crate::Result<Value> {
    let args: ExplainArgs = parse_args("explain", args)?;
    Ok(explain(&ctx, &args.resource, args.command.as_deref()))
}

async fn execute_tool(ctx: Arc<Ctx>, args: JsonObject) -> crate::Result<Value> {
    let args: ExecuteArgs = parse_args("execute", args)?;
    Ok(Value::String(execute(&ctx, args).await))
}

/// `{"resources": [...]}` with the names that passed the resource filter.
pub fn resources(ctx: &Ctx) -> Value {
    json!({ "resources": ctx.resources })
}

/// Describe a resource's commands, or one command's arguments and body
/// model. Lookup failures are reported in-band under `error`.
pub fn explain(ctx: &Ctx, resource: &str, command: Option<&str>) -> Value {
    let commands = match ctx.catalog.commands_for(resource) {
        Ok(commands) => commands,
        Err(e) => return json!({ "error": format!("Resource '{}' not found: {}", resource, e) }),
    };

    let Some(command) = command else {
        let mut summaries = Map::new();
        for (name, spec) in commands {
            summaries.insert(
                name.clone(),
                json!({
                    "summary": first_line(&render_doc(&spec.doc, resource)),
                    "aliases": spec.aliases,
                }),
            );
        }
        return json!({ "resource": resource, "commands": summaries });
    };

    let Ok((command, spec)) = ctx.catalog.command(resource, command) else {
        return json!({
            "error": format!("Command '{}' not found on resource '{}'.", command, resource),
            "available": commands.keys().collect::<Vec<_>>(),
        });
    };

    let model = spec.model.as_deref();
    let args: Vec<Value> = spec.args.iter().map(|arg| describe_arg(arg, model)).collect();

    let mut result = json!({
        "resource": resource,
        "command": command,
        "aliases": spec.aliases,
        "args": args,
        "docstring": render_doc(&spec.doc, resource),
    });

    if let Some(model) = model {
        result["model"] = json!(model);
        if let Some(model_spec) = ctx.catalog.load_model(model) {
            result["model_fields"] = Value::Object(describe_model_fields(&ctx.catalog, model_spec));
        }
    }
    result
}

fn describe_arg(arg: &ArgSpec, model: Option<&str>) -> Value {
    let name = arg.param_name();
    let mut info = match model {
        Some(model) if arg.is_body() => json!({
            "name": name,
            "type": model,
            "help": "See model fields below for schema details",
        }),
        _ => json!({
            "name": name,
            "type": arg.kind.type_name(),
            "help": arg.help,
        }),
    };
    if let Some(default) = &arg.default {
        info["default"] = Value::String(display_default(default));
    }
    info
}

/// Defaults are shown the way duploctl prints them.
fn display_default(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Run one duploctl command on behalf of a client.
///
/// Filter rejections and failures are returned as `Error: ...` text. Query,
/// output and wait apply to this call only.
pub async fn execute(ctx: &Ctx, args: ExecuteArgs) -> String {
    if !ctx.resources.iter().any(|r| r == &args.resource) {
        return format!(
            "Error: Resource '{}' is not allowed by the resource filter.",
            args.resource
        );
    }
    let allowed = NameFilter::new(&ctx.config.command_filter).map(|f| f.matches(&args.command));
    match allowed {
        Ok(true) => {}
        Ok(false) => {
            return format!(
                "Error: Command '{}' is not allowed by the command filter.",
                args.command
            );
        }
        Err(e) => return format!("Error: {}", e),
    }

    let mut invocation = Invocation::new(&args.resource, &args.command);
    invocation.name = args.name;
    invocation.args = args.args.unwrap_or_default();
    invocation.body = args.body.map(Value::Object);
    invocation.query = args.query;
    invocation.output = args.output;
    invocation.wait = args.wait;

    match ctx.client.dispatch(invocation).await {
        Ok(output) if output.success() => output.stdout.trim_end().to_string(),
        Ok(output) => format!("Error: {}", output.failure_message()),
        Err(e) => format!("Error: {}", e),
    }
}

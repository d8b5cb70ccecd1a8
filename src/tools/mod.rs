//! Expanded-mode registration: one MCP tool per duploctl resource and
//! command.
//!
//! [`ToolRegistrar`] walks the catalog, applies the command filter and
//! registers a tool named `{resource}_{command}` whose input schema is built
//! from the command's arguments. Each tool is backed by a [`CommandBinding`]
//! that validates call arguments and turns them into an [`Invocation`].

pub mod schema;
pub mod template;

use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde_json::{Map, Value, json};

use crate::catalog::{ArgKind, ArgSpec, Catalog, CommandSpec, ModelSpec};
use crate::duplo::Invocation;
use crate::error::DuploMcpError;
use crate::filter::NameFilter;
use crate::toolbox::{ReadResource, ToolBox, ToolTarget};

/// Commands that only read state. Those without required parameters are
/// also exposed as MCP resources.
pub const READ_OPERATIONS: [&str; 4] = ["list", "find", "logs", "pods"];

/// How a parameter reaches duploctl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Positional,
    /// Passed as the given option string.
    Flag(String),
    /// Sent as JSON on stdin.
    Body,
}

/// One tool parameter derived from an [`ArgSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub binding: Binding,
    pub kind: ArgKind,
    pub help: String,
    pub required: bool,
    pub default: Option<Value>,
    pub choices: Vec<String>,
    /// Body model name, set only when the model resolves.
    pub model: Option<String>,
    /// JSON Schema for the parameter.
    pub schema: Value,
}

impl Param {
    fn expects(&self, value: &Value) -> bool {
        match (&self.binding, self.kind) {
            (Binding::Body, _) => value.is_object(),
            (_, ArgKind::String) | (_, ArgKind::File) => value.is_string(),
            (_, ArgKind::Integer) => value.is_i64() || value.is_u64(),
            (_, ArgKind::Number) => value.is_number(),
            (_, ArgKind::Boolean) => value.is_boolean(),
            (_, ArgKind::List) => value.is_array(),
            (_, ArgKind::Object) => value.is_object(),
        }
    }

    fn expected_type(&self) -> &'static str {
        match (&self.binding, self.kind) {
            (Binding::Body, _) => "object",
            (_, ArgKind::File) => "string",
            (_, kind) => kind.json_type(),
        }
    }
}

/// Build the tool parameters for a command.
///
/// The parameter name is the argument's `dest` when set, else its name. The
/// `body` parameter takes the command's model schema when the model resolves
/// and degrades to a plain object otherwise; models never apply to other
/// parameters.
pub fn build_params(catalog: &Catalog, command: &CommandSpec) -> Vec<Param> {
    command
        .args
        .iter()
        .map(|arg| build_param(catalog, command, arg))
        .collect()
}

fn build_param(catalog: &Catalog, command: &CommandSpec, arg: &ArgSpec) -> Param {
    let binding = if arg.is_body() {
        Binding::Body
    } else {
        match arg.option_string() {
            Some(flag) => Binding::Flag(flag.to_string()),
            None => Binding::Positional,
        }
    };

    let model_schema = match (&binding, command.model.as_deref()) {
        (Binding::Body, Some(model)) => {
            let schema = schema::model_schema(catalog, model);
            if schema.is_none() {
                tracing::debug!(model = %model, "body model not in catalog, using a plain object");
            }
            schema.map(|s| (model.to_string(), s))
        }
        _ => None,
    };

    let (model, mut schema) = match model_schema {
        Some((name, schema)) => (Some(name), schema),
        None => (None, kind_schema(&binding, arg.kind)),
    };

    if let Some(obj) = schema.as_object_mut() {
        if !arg.help.is_empty() && !obj.contains_key("description") {
            obj.insert("description".to_string(), Value::String(arg.help.clone()));
        }
        if let Some(default) = &arg.default {
            obj.insert("default".to_string(), default.clone());
        }
        if !arg.choices.is_empty() {
            obj.insert("enum".to_string(), json!(arg.choices));
        }
    }

    Param {
        name: arg.param_name().to_string(),
        binding,
        kind: arg.kind,
        help: arg.help.clone(),
        required: arg.required && arg.default.is_none(),
        default: arg.default.clone(),
        choices: arg.choices.clone(),
        model,
        schema,
    }
}

fn kind_schema(binding: &Binding, kind: ArgKind) -> Value {
    match (binding, kind) {
        (Binding::Body, _) => json!({ "type": "object" }),
        (_, ArgKind::File) => json!({ "type": "string" }),
        (_, ArgKind::List) => json!({ "type": "array", "items": { "type": "string" } }),
        (_, kind) => json!({ "type": kind.json_type() }),
    }
}

/// JSON Schema object for a tool taking `params`.
pub fn build_input_schema(params: &[Param]) -> JsonObject {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in params {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema.insert("additionalProperties".to_string(), json!(false));
    schema
}

/// A registered duploctl command: validates call arguments and builds the
/// invocation.
#[derive(Debug, Clone)]
pub struct CommandBinding {
    pub resource: String,
    pub command: String,
    pub params: Vec<Param>,
    /// Body model, used to check required fields.
    pub body_model: Option<ModelSpec>,
}

impl CommandBinding {
    pub fn new(catalog: &Catalog, resource: &str, command: &str, spec: &CommandSpec) -> Self {
        let params = build_params(catalog, spec);
        let body_model = params
            .iter()
            .find_map(|p| p.model.as_deref())
            .and_then(|m| catalog.load_model(m))
            .cloned();
        Self {
            resource: resource.to_string(),
            command: command.to_string(),
            params,
            body_model,
        }
    }

    pub fn tool_name(&self) -> String {
        format!("{}_{}", self.resource, self.command)
    }

    pub fn has_required_params(&self) -> bool {
        self.params.iter().any(|p| p.required)
    }

    fn invalid(&self, message: String) -> DuploMcpError {
        DuploMcpError::InvalidArguments(self.tool_name(), message)
    }

    /// Check `args` against the parameter list: no unknown keys, required
    /// parameters present, JSON types and choices respected, and required
    /// body model fields present.
    pub fn validate(&self, args: &JsonObject) -> crate::Result<()> {
        for key in args.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(self.invalid(format!("unknown argument '{}'", key)));
            }
        }

        for param in &self.params {
            let value = args.get(&param.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                if param.required {
                    return Err(self.invalid(format!("missing required argument '{}'", param.name)));
                }
                continue;
            };

            if !param.expects(value) {
                return Err(self.invalid(format!(
                    "argument '{}' must be of type {}",
                    param.name,
                    param.expected_type()
                )));
            }

            if let (false, Some(s)) = (param.choices.is_empty(), value.as_str()) {
                if !param.choices.iter().any(|c| c == s) {
                    return Err(self.invalid(format!(
                        "argument '{}' must be one of: {}",
                        param.name,
                        param.choices.join(", ")
                    )));
                }
            }

            if let (Binding::Body, Some(model), Some(body)) =
                (&param.binding, &self.body_model, value.as_object())
            {
                let missing = schema::missing_required_fields(model, body);
                if !missing.is_empty() {
                    return Err(self.invalid(format!(
                        "body is missing required field(s): {}",
                        missing.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate `args` and build the duploctl invocation.
    ///
    /// Positional values are appended in declaration order. A `true` boolean
    /// emits its flag alone; `false` and null emit nothing. Lists emit the
    /// flag followed by each item. Defaults are left to duploctl.
    pub fn invocation(&self, args: Option<JsonObject>) -> crate::Result<Invocation> {
        let args = args.unwrap_or_default();
        self.validate(&args)?;

        let mut invocation = Invocation::new(&self.resource, &self.command);
        for param in &self.params {
            let Some(value) = args.get(&param.name).filter(|v| !v.is_null()) else {
                continue;
            };
            match &param.binding {
                Binding::Body => invocation.body = Some(value.clone()),
                Binding::Positional => match value {
                    Value::Array(items) => invocation.args.extend(items.iter().map(scalar_arg)),
                    other => invocation.args.push(scalar_arg(other)),
                },
                Binding::Flag(flag) => match value {
                    Value::Bool(true) => invocation.args.push(flag.clone()),
                    Value::Bool(false) => {}
                    Value::Array(items) => {
                        invocation.args.push(flag.clone());
                        invocation.args.extend(items.iter().map(scalar_arg));
                    }
                    other => {
                        invocation.args.push(flag.clone());
                        invocation.args.push(scalar_arg(other));
                    }
                },
            }
        }
        Ok(invocation)
    }
}

/// argv form of a JSON value: strings verbatim, everything else as JSON.
fn scalar_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Registers expanded-mode tools for catalog resources.
pub struct ToolRegistrar<'a> {
    catalog: &'a Catalog,
    command_filter: &'a NameFilter,
}

impl<'a> ToolRegistrar<'a> {
    pub fn new(catalog: &'a Catalog, command_filter: &'a NameFilter) -> Self {
        Self {
            catalog,
            command_filter,
        }
    }

    /// Register every resource in `names`. A resource that fails is logged
    /// and skipped.
    pub fn register(&self, toolbox: &mut ToolBox, names: &[String]) {
        for name in names {
            if let Err(e) = self.register_resource(toolbox, name) {
                tracing::error!(resource = %name, error = %e, "failed to register resource");
            }
        }
    }

    /// Register the filtered commands of one resource. Returns the number
    /// of tools added.
    pub fn register_resource(&self, toolbox: &mut ToolBox, resource: &str) -> crate::Result<usize> {
        let commands = self.catalog.commands_for(resource)?;
        tracing::info!("--- {}", resource);

        let mut count = 0;
        for (command, spec) in commands {
            if !self.command_filter.matches(command) {
                tracing::debug!(
                    "    Skipping {}_{} (filtered by command filter)",
                    resource,
                    command
                );
                continue;
            }
            self.register_tool(toolbox, resource, command, spec);
            count += 1;
        }
        Ok(count)
    }

    /// Register `{resource}_{command}` and, for argument-free read commands,
    /// the `duplo://{resource}/{command}` resource.
    pub fn register_tool(
        &self,
        toolbox: &mut ToolBox,
        resource: &str,
        command: &str,
        spec: &CommandSpec,
    ) {
        let binding = CommandBinding::new(self.catalog, resource, command, spec);
        let name = binding.tool_name();
        let description = template::render_doc(&spec.doc, resource);

        tracing::info!("    {}{}", name, template::docstring_summary(&description));

        let tool = Tool {
            name: name.clone().into(),
            title: None,
            description: (!description.is_empty()).then(|| description.clone().into()),
            input_schema: Arc::new(build_input_schema(&binding.params)),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        };

        if READ_OPERATIONS.contains(&command) && !binding.has_required_params() {
            toolbox.insert_resource(ReadResource {
                uri: format!("duplo://{}/{}", resource, command),
                name: name.clone(),
                description: template::first_paragraph(&description),
                binding: binding.clone(),
            });
        }

        toolbox.insert_tool(tool, ToolTarget::Command(binding));
    }
}

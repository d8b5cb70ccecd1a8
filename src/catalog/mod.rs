//! duploctl resource/command catalog.
//!
//! The catalog is metadata only: which resources exist, which commands each
//! resource offers, and the arguments and body models of those commands.
//! Commands themselves always run in the duploctl executable.
//!
//! A catalog comes either from a TOML, JSON or YAML file or from walking
//! duploctl's `--help` output (see [`discovery`]).

pub mod discovery;
pub mod help_parser;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DuploMcpError;

/// Resource name to its commands, plus named body models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSpec>,
}

/// One command on a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Docstring; may contain `{{kind}}` template variables.
    #[serde(default)]
    pub doc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Arguments in the order duploctl declares them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
    /// Body model name, looked up in [`Catalog::models`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One duploctl argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    /// Parameter name override. duploctl's body argument is `file` with
    /// dest `body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Option strings such as `["-f", "--file"]`. Empty for positionals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default)]
    pub kind: ArgKind,
    #[serde(default)]
    pub help: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ArgSpec {
    /// The tool parameter name: `dest` when set, else `name`.
    pub fn param_name(&self) -> &str {
        self.dest.as_deref().unwrap_or(&self.name)
    }

    pub fn is_positional(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn is_body(&self) -> bool {
        self.param_name() == "body"
    }

    /// The option string passed to duploctl: the first long flag, else the
    /// first flag.
    pub fn option_string(&self) -> Option<&str> {
        self.flags
            .iter()
            .find(|f| f.starts_with("--"))
            .or_else(|| self.flags.first())
            .map(String::as_str)
    }
}

/// Value kind of an argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    List,
    Object,
    File,
}

impl ArgKind {
    /// Python-flavoured type name shown by `explain`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "str",
            Self::Integer => "int",
            Self::Number => "float",
            Self::Boolean => "bool",
            Self::List => "list",
            Self::Object => "dict",
            Self::File => "FileType",
        }
    }

    /// JSON Schema `type` keyword.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::List => "array",
            Self::Object | Self::File => "object",
        }
    }
}

/// A named body schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

/// One model field.
///
/// `type` is a type expression such as `str`, `int`, `bool`, `dict[str, str]`,
/// `list[str]` or the name of another model. `model` names a nested model
/// whose fields are described recursively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default = "default_field_type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Wire name used in request bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_field_type() -> String {
    "any".to_string()
}

impl FieldSpec {
    /// Key the field is sent under: alias when set, else the field name.
    pub fn wire_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.alias.as_deref().unwrap_or(name)
    }
}

impl Catalog {
    /// Load a catalog file. The format follows the extension: `.toml`,
    /// `.json`, `.yaml` or `.yml`.
    pub fn load_file(path: &Path) -> crate::Result<Self> {
        let source = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DuploMcpError::Catalog(source.clone(), e.to_string()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Self::from_toml(&source, &content),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| DuploMcpError::Catalog(source, e.to_string())),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| DuploMcpError::Catalog(source, e.to_string())),
            _ => Err(DuploMcpError::Catalog(
                source,
                "unsupported catalog format (expected .toml, .json, .yaml or .yml)".to_string(),
            )),
        }
    }

    fn from_toml(source: &str, content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| DuploMcpError::Catalog(source.to_string(), e.to_string()))
    }

    /// Sorted resource names.
    pub fn resource_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn commands_for(&self, resource: &str) -> crate::Result<&BTreeMap<String, CommandSpec>> {
        self.resources
            .get(resource)
            .map(|r| &r.commands)
            .ok_or_else(|| DuploMcpError::UnknownResource(resource.to_string()))
    }

    /// Look up a command by name or alias.
    pub fn command(&self, resource: &str, command: &str) -> crate::Result<(&str, &CommandSpec)> {
        let commands = self.commands_for(resource)?;
        if let Some((name, spec)) = commands.get_key_value(command) {
            return Ok((name.as_str(), spec));
        }
        commands
            .iter()
            .find(|(_, spec)| spec.aliases.iter().any(|a| a == command))
            .map(|(name, spec)| (name.as_str(), spec))
            .ok_or_else(|| {
                DuploMcpError::UnknownCommand(resource.to_string(), command.to_string())
            })
    }

    /// Resolve a model by name; `None` when the catalog does not define it.
    pub fn load_model(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn command_count(&self) -> usize {
        self.resources.values().map(|r| r.commands.len()).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Tenant catalog used across the crate's tests.
    pub(crate) fn tenant_catalog() -> Catalog {
        serde_yaml::from_str(TENANT_YAML).expect("valid tenant catalog")
    }

    pub(crate) const TENANT_YAML: &str = r#"
resources:
  tenant:
    commands:
      list:
        doc: "Retrieve a list of all {{kind}} resources.\n\nReturns every {{kind | lower}} visible to the token."
        aliases: [ls]
      find:
        doc: "Find a {{kind}} by name."
        aliases: [get]
        args:
          - name: name
            help: The name of the tenant.
            required: true
      create:
        doc: "Create a {{kind}}."
        model: AddTenantRequest
        args:
          - name: file
            dest: body
            flags: ["-f", "--file"]
            kind: file
            help: A file to read the input from.
            required: true
      delete:
        doc: "Delete a {{kind}}."
        args:
          - name: name
            help: The name of the tenant.
            required: true
          - name: wait
            flags: ["--wait"]
            kind: boolean
            help: Wait for the operation to complete.
            default: false
  service:
    commands:
      list:
        doc: "List services."
      logs:
        doc: "Show logs for a service."
        args:
          - name: name
            required: true
models:
  AddTenantRequest:
    fields:
      account_name:
        type: str
        required: true
        alias: AccountName
        description: Name of the tenant.
      plan_id:
        type: str
        alias: PlanID
      tags:
        type: dict[str, str]
      metadata:
        type: TenantMeta
        model: TenantMeta
  TenantMeta:
    fields:
      owner:
        type: str
        alias: Owner
"#;

    #[test]
    fn test_yaml_catalog_parses() {
        let catalog = tenant_catalog();
        assert_eq!(catalog.resource_names(), vec!["service", "tenant"]);
        let commands = catalog.commands_for("tenant").unwrap();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands["create"].model.as_deref(), Some("AddTenantRequest"));
        assert_eq!(commands["create"].args[0].param_name(), "body");
        assert!(commands["create"].args[0].is_body());
        assert_eq!(catalog.command_count(), 6);
    }

    #[test]
    fn test_unknown_resource() {
        let catalog = tenant_catalog();
        assert!(matches!(
            catalog.commands_for("lambda"),
            Err(DuploMcpError::UnknownResource(r)) if r == "lambda"
        ));
    }

    #[test]
    fn test_command_by_alias() {
        let catalog = tenant_catalog();
        let (name, _) = catalog.command("tenant", "ls").unwrap();
        assert_eq!(name, "list");
        assert!(matches!(
            catalog.command("tenant", "explode"),
            Err(DuploMcpError::UnknownCommand(r, c)) if r == "tenant" && c == "explode"
        ));
    }

    #[test]
    fn test_load_model() {
        let catalog = tenant_catalog();
        let model = catalog.load_model("AddTenantRequest").unwrap();
        assert_eq!(model.fields["account_name"].wire_name("account_name"), "AccountName");
        assert_eq!(model.fields["tags"].wire_name("tags"), "tags");
        assert!(catalog.load_model("MissingModel").is_none());
    }

    #[test]
    fn test_option_string_prefers_long_flag() {
        let arg = ArgSpec {
            name: "file".to_string(),
            flags: vec!["-f".to_string(), "--file".to_string()],
            ..Default::default()
        };
        assert_eq!(arg.option_string(), Some("--file"));
        assert!(!arg.is_positional());
    }

    #[test]
    fn test_load_toml_file() {
        let mut temp = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(
            temp,
            r#"
[resources.tenant.commands.list]
doc = "List tenants."
aliases = ["ls"]

[[resources.tenant.commands.find.args]]
name = "name"
required = true
"#
        )
        .expect("write");

        let catalog = Catalog::load_file(temp.path()).unwrap();
        let commands = catalog.commands_for("tenant").unwrap();
        assert_eq!(commands["list"].aliases, vec!["ls"]);
        assert_eq!(commands["find"].args[0].kind, ArgKind::String);
        assert!(commands["find"].args[0].required);
    }

    #[test]
    fn test_load_json_file() {
        let mut temp = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("create temp file");
        write!(
            temp,
            r#"{{"resources": {{"service": {{"commands": {{"list": {{"doc": "List services."}}}}}}}}}}"#
        )
        .expect("write");

        let catalog = Catalog::load_file(temp.path()).unwrap();
        assert_eq!(catalog.resource_names(), vec!["service"]);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut temp = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("create temp file");
        write!(temp, "{}", TENANT_YAML).expect("write");

        let catalog = Catalog::load_file(temp.path()).unwrap();
        assert_eq!(catalog, tenant_catalog());
    }

    #[test]
    fn test_unsupported_extension() {
        let mut temp = NamedTempFile::new().expect("create temp file");
        writeln!(temp, "resources = {{}}").expect("write");
        let result = Catalog::load_file(temp.path());
        assert!(
            matches!(result, Err(DuploMcpError::Catalog(_, msg)) if msg.contains("unsupported"))
        );
    }

    #[test]
    fn test_invalid_toml_reports_source() {
        let mut temp = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(temp, "this is not valid toml {{{{").expect("write");
        let path = temp.path().display().to_string();
        let result = Catalog::load_file(temp.path());
        assert!(matches!(result, Err(DuploMcpError::Catalog(source, _)) if source == path));
    }
}

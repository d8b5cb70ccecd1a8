//! Server settings: command-line overrides, `DUPLO_MCP_*` environment binding
//! and defaults.

use crate::error::DuploMcpError;
use crate::filter::{MATCH_ALL, NameFilter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DUPLOCTL: &str = "duploctl";

fn default_timeout_secs() -> u64 {
    300
}

fn default_discovery_budget_secs() -> u64 {
    120
}

/// MCP transport the server listens on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    #[default]
    Http,
}

impl FromStr for Transport {
    type Err = DuploMcpError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            other => Err(DuploMcpError::InvalidSetting(
                "transport".to_string(),
                format!("'{}' is not one of: stdio, http", other),
            )),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// How duploctl commands are registered as MCP tools.
///
/// `Expanded` registers one tool per resource and command. `Compact` registers
/// the generic `resources`, `explain` and `execute` tools instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    #[default]
    Expanded,
    Compact,
}

impl FromStr for ToolMode {
    type Err = DuploMcpError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "expanded" => Ok(Self::Expanded),
            "compact" => Ok(Self::Compact),
            other => Err(DuploMcpError::InvalidSetting(
                "tool_mode".to_string(),
                format!("'{}' is not one of: expanded, compact", other),
            )),
        }
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expanded => f.write_str("expanded"),
            Self::Compact => f.write_str("compact"),
        }
    }
}

/// Values given explicitly on the command line. `None` defers to the
/// environment and then to the default.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub resource_filter: Option<String>,
    pub command_filter: Option<String>,
    pub tool_mode: Option<ToolMode>,
    pub duploctl: Option<String>,
    pub duplo_args: Vec<String>,
    pub catalog: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub discovery_budget_secs: Option<u64>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub resource_filter: String,
    pub command_filter: String,
    pub tool_mode: ToolMode,
    /// duploctl executable name or path.
    pub duploctl: String,
    /// Flags appended to every duploctl invocation (e.g. `--tenant dev`).
    pub duplo_args: Vec<String>,
    pub catalog: Option<PathBuf>,
    pub timeout_secs: u64,
    pub discovery_budget_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            resource_filter: MATCH_ALL.to_string(),
            command_filter: MATCH_ALL.to_string(),
            tool_mode: ToolMode::default(),
            duploctl: DEFAULT_DUPLOCTL.to_string(),
            duplo_args: Vec::new(),
            catalog: None,
            timeout_secs: default_timeout_secs(),
            discovery_budget_secs: default_discovery_budget_secs(),
        }
    }
}

/// First set variable in `vars`, in order.
fn first_env(env: &impl Fn(&str) -> Option<String>, vars: &[&str]) -> Option<(String, String)> {
    vars.iter()
        .find_map(|var| env(var).map(|value| (var.to_string(), value)))
}

fn parse_env<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    vars: &[&str],
) -> crate::Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match first_env(env, vars) {
        Some((var, value)) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| DuploMcpError::InvalidSetting(var, format!("'{}': {}", value, e))),
        None => Ok(None),
    }
}

impl ServerSettings {
    /// Resolve settings: explicit override, then environment, then default.
    ///
    /// `env` looks up a variable by name; pass `|k| std::env::var(k).ok()` for
    /// the process environment.
    pub fn resolve(
        overrides: SettingsOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> crate::Result<Self> {
        let defaults = Self::default();

        let transport = match overrides.transport {
            Some(t) => t,
            None => parse_env(&env, &["DUPLO_MCP_TRANSPORT"])?.unwrap_or(defaults.transport),
        };
        let port = match overrides.port {
            Some(p) => p,
            None => parse_env(&env, &["DUPLO_MCP_PORT", "PORT"])?.unwrap_or(defaults.port),
        };
        let tool_mode = match overrides.tool_mode {
            Some(m) => m,
            None => parse_env(&env, &["DUPLO_MCP_TOOL_MODE"])?.unwrap_or(defaults.tool_mode),
        };
        let string_setting = |value: Option<String>, var: &str, default: String| {
            value
                .or_else(|| first_env(&env, &[var]).map(|(_, v)| v))
                .unwrap_or(default)
        };
        let host = string_setting(overrides.host, "DUPLO_MCP_HOST", defaults.host);
        let resource_filter = string_setting(
            overrides.resource_filter,
            "DUPLO_MCP_RESOURCE_FILTER",
            defaults.resource_filter,
        );
        let command_filter = string_setting(
            overrides.command_filter,
            "DUPLO_MCP_COMMAND_FILTER",
            defaults.command_filter,
        );
        let duploctl = string_setting(overrides.duploctl, "DUPLO_MCP_DUPLOCTL", defaults.duploctl);
        let catalog = overrides
            .catalog
            .or_else(|| first_env(&env, &["DUPLO_MCP_CATALOG"]).map(|(_, v)| PathBuf::from(v)));

        let settings = Self {
            transport,
            host,
            port,
            resource_filter,
            command_filter,
            tool_mode,
            duploctl,
            duplo_args: overrides.duplo_args,
            catalog,
            timeout_secs: overrides.timeout_secs.unwrap_or(defaults.timeout_secs),
            discovery_budget_secs: overrides
                .discovery_budget_secs
                .unwrap_or(defaults.discovery_budget_secs),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Fail fast on settings that would only break later.
    pub fn validate(&self) -> crate::Result<()> {
        NameFilter::new(&self.resource_filter)?;
        NameFilter::new(&self.command_filter)?;

        if self.duploctl.trim().is_empty() {
            return Err(DuploMcpError::InvalidSetting(
                "duploctl".to_string(),
                "executable must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(DuploMcpError::InvalidSetting(
                "timeout_secs".to_string(),
                "must be > 0".to_string(),
            ));
        }
        if self.catalog.is_none() && self.discovery_budget_secs == 0 {
            return Err(DuploMcpError::InvalidSetting(
                "discovery_budget_secs".to_string(),
                "must be > 0 when no catalog file is given".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resource_filter(&self) -> crate::Result<NameFilter> {
        NameFilter::new(&self.resource_filter)
    }

    pub fn command_filter(&self) -> crate::Result<NameFilter> {
        NameFilter::new(&self.command_filter)
    }

    /// The subset reported under `MCP` by the `config` tool.
    pub fn mcp_settings(&self) -> McpSettings {
        McpSettings {
            transport: self.transport,
            port: self.port,
            resource_filter: self.resource_filter.clone(),
            command_filter: self.command_filter.clone(),
            tool_mode: self.tool_mode,
        }
    }
}

/// MCP server settings summary exposed to custom tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpSettings {
    pub transport: Transport,
    pub port: u16,
    pub resource_filter: String,
    pub command_filter: String,
    pub tool_mode: ToolMode,
}

impl Default for McpSettings {
    fn default() -> Self {
        ServerSettings::default().mcp_settings()
    }
}

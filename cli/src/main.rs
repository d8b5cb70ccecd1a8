//! duplocloud-mcp: serve duploctl resources and commands as MCP tools.
//!
//! Every flag is optional; unset flags fall back to the `DUPLO_MCP_*`
//! environment variables and then to the defaults. Arguments after `--` are
//! passed to every duploctl call (e.g. `-- --tenant dev`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use duplocloud_mcp::catalog::discovery::summarize;
use duplocloud_mcp::{
    Catalog, DiscoveryConfig, Dispatch, DuploClient, DuploCloudMcp, ServerSettings,
    SettingsOverrides, ToolMode, Transport, discover_catalog,
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog file looked up in the working directory.
const CATALOG_FILE: &str = "duplo-catalog.toml";

/// Catalog file looked up under `<config dir>/duplocloud-mcp/`.
const CONFIG_CATALOG_FILE: &str = "catalog.toml";

/// DuploCloud MCP Server
#[derive(Parser)]
#[command(name = "duplocloud-mcp", version, about = "DuploCloud MCP Server")]
struct Cli {
    /// The transport protocol to use [env: DUPLO_MCP_TRANSPORT] [default: http]
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,
    /// The port to listen on for HTTP transport [env: DUPLO_MCP_PORT, PORT] [default: 8000]
    #[arg(short, long)]
    port: Option<u16>,
    /// Bind address for HTTP transport [env: DUPLO_MCP_HOST] [default: 0.0.0.0]
    #[arg(long)]
    host: Option<String>,
    /// Regex for resource names to include, full match [env: DUPLO_MCP_RESOURCE_FILTER] [default: .*]
    #[arg(long)]
    resource_filter: Option<String>,
    /// Regex for command names to include, full match [env: DUPLO_MCP_COMMAND_FILTER] [default: .*]
    #[arg(long)]
    command_filter: Option<String>,
    /// expanded (one tool per resource and command) or compact (resources, explain, execute)
    /// [env: DUPLO_MCP_TOOL_MODE] [default: expanded]
    #[arg(long, value_enum)]
    tool_mode: Option<ToolModeArg>,
    /// duploctl executable [env: DUPLO_MCP_DUPLOCTL] [default: duploctl]
    #[arg(long)]
    duploctl: Option<String>,
    /// Catalog file (.toml, .json, .yaml) [env: DUPLO_MCP_CATALOG]
    /// [default: ./duplo-catalog.toml or <config dir>/duplocloud-mcp/catalog.toml]
    #[arg(short, long)]
    catalog: Option<PathBuf>,
    /// Seconds before a duploctl call is killed [default: 300]
    #[arg(long)]
    timeout: Option<u64>,
    /// Seconds allowed for catalog discovery when no catalog file is found [default: 120]
    #[arg(long)]
    discovery_budget: Option<u64>,
    /// Arguments passed to every duploctl call
    #[arg(last = true)]
    duplo_args: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TransportArg {
    Stdio,
    Http,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => Transport::Stdio,
            TransportArg::Http => Transport::Http,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ToolModeArg {
    Expanded,
    Compact,
}

impl From<ToolModeArg> for ToolMode {
    fn from(arg: ToolModeArg) -> Self {
        match arg {
            ToolModeArg::Expanded => ToolMode::Expanded,
            ToolModeArg::Compact => ToolMode::Compact,
        }
    }
}

impl Cli {
    fn into_overrides(self) -> SettingsOverrides {
        SettingsOverrides {
            transport: self.transport.map(Into::into),
            host: self.host,
            port: self.port,
            resource_filter: self.resource_filter,
            command_filter: self.command_filter,
            tool_mode: self.tool_mode.map(Into::into),
            duploctl: self.duploctl,
            duplo_args: self.duplo_args,
            catalog: self.catalog,
            timeout_secs: self.timeout,
            discovery_budget_secs: self.discovery_budget,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the stdio transport.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = ServerSettings::resolve(cli.into_overrides(), |k| std::env::var(k).ok())
        .map_err(|e| anyhow::anyhow!("Invalid settings: {}", e))?;

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down DuploCloud MCP server...");
        cancel_for_signal.cancel();
    });

    let client = Arc::new(DuploClient::from_settings(&settings));
    let environment = load_environment(client.as_ref()).await;

    settings.catalog = resolve_catalog(settings.catalog.take());
    let catalog = match &settings.catalog {
        Some(path) => Catalog::load_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load catalog {:?}: {}", path, e))?,
        None => discover(&settings, &environment).await?,
    };

    let mut server = DuploCloudMcp::new(settings, client, Arc::new(catalog))
        .map_err(|e| anyhow::anyhow!("Failed to build server: {}", e))?
        .with_environment(environment);
    server.register_tools(None);

    server
        .start(cancel)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

/// duploctl's environment summary. Startup continues without it.
async fn load_environment(client: &dyn Dispatch) -> Map<String, Value> {
    match client.environment().await {
        Ok(environment) => environment,
        Err(e) => {
            tracing::warn!(error = %e, "could not read duploctl environment");
            Map::new()
        }
    }
}

/// Catalog file path: explicit flag or env, then `./duplo-catalog.toml`,
/// then `<config dir>/duplocloud-mcp/catalog.toml`. `None` means
/// discover from duploctl.
fn resolve_catalog(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let local = Path::new(CATALOG_FILE);
    if local.exists() {
        return Some(local.to_path_buf());
    }

    dirs::config_dir()
        .map(|dir| dir.join("duplocloud-mcp").join(CONFIG_CATALOG_FILE))
        .filter(|path| path.exists())
}

/// Build the catalog from duploctl's `--help` output for the resources
/// duploctl reports, limited to those the resource filter keeps.
async fn discover(settings: &ServerSettings, environment: &Map<String, Value>) -> Result<Catalog> {
    let resource_filter = settings
        .resource_filter()
        .map_err(|e| anyhow::anyhow!("Invalid resource filter: {}", e))?;

    let resources: Vec<String> = environment
        .get("AvailableResources")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| resource_filter.matches(name))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if resources.is_empty() {
        return Err(anyhow::anyhow!(
            "No catalog file found and duploctl reported no resources. \
             Searched ./{} and <config dir>/duplocloud-mcp/{}. Use --catalog to specify a path.",
            CATALOG_FILE,
            CONFIG_CATALOG_FILE
        ));
    }

    let config = DiscoveryConfig {
        command: settings.duploctl.clone(),
        base_args: settings.duplo_args.clone(),
        total_budget: Duration::from_secs(settings.discovery_budget_secs),
        ..Default::default()
    };
    let result = discover_catalog(config, resources).await;

    if result.timed_out {
        tracing::warn!("catalog discovery ran out of time, serving a partial catalog");
    }
    for (path, reason) in &result.errors {
        tracing::debug!(path = ?path, reason = %reason, "discovery error");
    }
    for (resource, commands) in summarize(&result.catalog) {
        tracing::debug!(resource = %resource, commands = ?commands, "discovered resource");
    }
    tracing::info!(
        resources = %result.catalog.resources.len(),
        commands = %result.catalog.command_count(),
        errors = %result.errors.len(),
        "catalog discovered"
    );

    Ok(result.catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_parses_transport_and_tool_mode() {
        let cli = Cli::try_parse_from([
            "duplocloud-mcp",
            "--transport",
            "stdio",
            "--tool-mode",
            "compact",
            "--",
            "--tenant",
            "dev",
        ])
        .unwrap();
        let overrides = cli.into_overrides();
        assert_eq!(overrides.transport, Some(Transport::Stdio));
        assert_eq!(overrides.tool_mode, Some(ToolMode::Compact));
        assert_eq!(overrides.duplo_args, vec!["--tenant", "dev"]);
    }

    #[test]
    fn test_unset_flags_stay_unset() {
        let overrides = Cli::try_parse_from(["duplocloud-mcp"])
            .unwrap()
            .into_overrides();
        assert_eq!(overrides.transport, None);
        assert_eq!(overrides.tool_mode, None);
    }

    #[test]
    fn test_rejects_unknown_transport() {
        let err = Cli::try_parse_from(["duplocloud-mcp", "--transport", "grpc"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        let rendered = err.to_string();
        assert!(rendered.contains("stdio"));
        assert!(rendered.contains("http"));
    }

    #[test]
    fn test_rejects_unknown_tool_mode() {
        let err = Cli::try_parse_from(["duplocloud-mcp", "--tool-mode", "flat"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }
}

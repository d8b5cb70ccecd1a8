//! Catalog discovery: walks duploctl's `--help` tree in two tiers
//! (resources, then their commands) with concurrency control and a
//! wall-clock budget.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::catalog::help_parser::{parse_command_help, parse_command_names, run_help};
use crate::catalog::{Catalog, CommandSpec, ResourceSpec};

/// Concurrent `--help` invocations.
const MAX_CONCURRENT_HELP: usize = 8;

/// Configuration for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// duploctl executable.
    pub command: String,
    /// Pass-through flags added to every `--help` run, as for dispatch.
    pub base_args: Vec<String>,
    /// Timeout per individual `--help` subprocess.
    pub timeout_per_help: Duration,
    /// Wall-clock budget for the entire discovery run.
    pub total_budget: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            command: "duploctl".to_string(),
            base_args: Vec::new(),
            timeout_per_help: Duration::from_secs(10),
            total_budget: Duration::from_secs(120),
        }
    }
}

/// Result of a discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub catalog: Catalog,
    /// Soft errors: (path, reason) for `--help` runs that failed.
    pub errors: Vec<(Vec<String>, String)>,
    /// True if the budget ran out (partial catalog).
    pub timed_out: bool,
}

/// Discover the commands and arguments of `resources`.
///
/// Tier one runs `duploctl <resource> --help` for every resource; tier two
/// runs `duploctl <resource> <command> --help` for every command found. The
/// budget is checked before each tier; a resource whose help fails is
/// recorded as an error and left out of the catalog, and a command whose
/// help fails is kept with no arguments.
pub async fn discover_catalog(config: DiscoveryConfig, resources: Vec<String>) -> DiscoveryResult {
    let deadline = Instant::now() + config.total_budget;
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_HELP));
    let mut result = DiscoveryResult::default();

    tracing::info!(
        command = %config.command,
        resources = %resources.len(),
        budget_secs = %config.total_budget.as_secs(),
        "starting duploctl catalog discovery"
    );

    // Tier one: resource -> command names.
    let resource_paths: Vec<Vec<String>> = resources.into_iter().map(|r| vec![r]).collect();
    let resource_helps = run_tier(&config, &semaphore, resource_paths, deadline).await;
    let Some(resource_helps) = resource_helps else {
        result.timed_out = true;
        tracing::warn!(command = %config.command, "discovery budget exceeded before resources");
        return result;
    };

    let mut command_paths = Vec::new();
    for (path, outcome) in resource_helps {
        match outcome {
            Ok(text) => {
                let names = parse_command_names(&text);
                tracing::debug!(
                    resource = ?path,
                    count = %names.len(),
                    "discovered commands"
                );
                let resource = result
                    .catalog
                    .resources
                    .entry(path[0].clone())
                    .or_insert_with(ResourceSpec::default);
                for name in names {
                    resource
                        .commands
                        .insert(name.clone(), CommandSpec::default());
                    let mut command_path = path.clone();
                    command_path.push(name);
                    command_paths.push(command_path);
                }
            }
            Err(reason) => {
                tracing::warn!(
                    command = %config.command,
                    path = ?path,
                    reason = %reason,
                    "help discovery failed for resource"
                );
                result.errors.push((path, reason));
            }
        }
    }

    // Tier two: command -> docstring and arguments.
    match run_tier(&config, &semaphore, command_paths, deadline).await {
        Some(command_helps) => {
            for (path, outcome) in command_helps {
                let target = format!("{} {}", config.command, path.join(" "));
                let parsed = outcome.and_then(|text| {
                    parse_command_help(&target, &text).map_err(|e| e.to_string())
                });
                match parsed {
                    Ok(spec) => {
                        if let Some(slot) = result
                            .catalog
                            .resources
                            .get_mut(&path[0])
                            .and_then(|r| r.commands.get_mut(&path[1]))
                        {
                            *slot = spec;
                        }
                    }
                    Err(reason) => {
                        tracing::debug!(path = ?path, reason = %reason, "command help skipped");
                        result.errors.push((path, reason));
                    }
                }
            }
        }
        None => {
            result.timed_out = true;
            tracing::warn!(
                command = %config.command,
                "discovery budget exceeded, commands have no argument metadata"
            );
        }
    }

    tracing::info!(
        command = %config.command,
        resources = %result.catalog.resources.len(),
        commands = %result.catalog.command_count(),
        errors = %result.errors.len(),
        timed_out = %result.timed_out,
        "duploctl catalog discovery complete"
    );

    result
}

type TierOutcome = Vec<(Vec<String>, std::result::Result<String, String>)>;

/// Run `--help` for every path concurrently. `None` when the deadline has
/// already passed.
async fn run_tier(
    config: &DiscoveryConfig,
    semaphore: &Arc<Semaphore>,
    paths: Vec<Vec<String>>,
    deadline: Instant,
) -> Option<TierOutcome> {
    if Instant::now() >= deadline {
        return None;
    }

    let mut handles = Vec::with_capacity(paths.len());
    for path in paths {
        let cmd = config.command.clone();
        let argv: Vec<String> = path.iter().chain(&config.base_args).cloned().collect();
        let timeout = config.timeout_per_help;
        let sem = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire().await;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = if remaining.is_zero() {
                Err("discovery budget exceeded".to_string())
            } else {
                run_help(&cmd, &argv, timeout.min(remaining))
                    .await
                    .map_err(|e| e.to_string())
            };
            (path, outcome)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(outcome) = handle.await {
            outcomes.push(outcome);
        }
    }
    Some(outcomes)
}

/// Command names only, keyed by resource. Used when logging a discovered
/// catalog.
pub fn summarize(catalog: &Catalog) -> BTreeMap<String, Vec<String>> {
    catalog
        .resources
        .iter()
        .map(|(name, spec)| (name.clone(), spec.commands.keys().cloned().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_config_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.command, "duploctl");
        assert_eq!(config.timeout_per_help, Duration::from_secs(10));
        assert_eq!(config.total_budget, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_no_resources_yields_empty_catalog() {
        let result = discover_catalog(DiscoveryConfig::default(), vec![]).await;
        assert!(result.catalog.resources.is_empty());
        assert!(result.errors.is_empty());
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_nonexistent_command_records_error() {
        let result = discover_catalog(
            DiscoveryConfig {
                command: "duplocloud-mcp-test-nonexistent-12345".to_string(),
                timeout_per_help: Duration::from_secs(2),
                total_budget: Duration::from_secs(5),
                ..Default::default()
            },
            vec!["tenant".to_string()],
        )
        .await;
        assert!(result.catalog.resources.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, vec!["tenant"]);
    }

    #[tokio::test]
    async fn test_zero_budget_times_out() {
        let result = discover_catalog(
            DiscoveryConfig {
                command: "echo".to_string(),
                timeout_per_help: Duration::from_secs(2),
                total_budget: Duration::ZERO,
                ..Default::default()
            },
            vec!["tenant".to_string()],
        )
        .await;
        assert!(result.timed_out);
        assert!(result.catalog.resources.is_empty());
    }

    #[tokio::test]
    async fn test_echo_resource_has_no_commands() {
        // `echo tenant --help` prints "tenant --help": no commands section.
        let result = discover_catalog(
            DiscoveryConfig {
                command: "echo".to_string(),
                timeout_per_help: Duration::from_secs(2),
                total_budget: Duration::from_secs(5),
                ..Default::default()
            },
            vec!["tenant".to_string()],
        )
        .await;
        assert!(!result.timed_out);
        let tenant = result.catalog.resources.get("tenant").unwrap();
        assert!(tenant.commands.is_empty());
    }

    #[tokio::test]
    async fn test_base_args_reach_help_runs() {
        // `echo tenant {list,find} --help` prints the choice list back.
        let result = discover_catalog(
            DiscoveryConfig {
                command: "echo".to_string(),
                base_args: vec!["{list,find}".to_string()],
                timeout_per_help: Duration::from_secs(2),
                total_budget: Duration::from_secs(5),
            },
            vec!["tenant".to_string()],
        )
        .await;
        assert!(!result.timed_out);
        let tenant = result.catalog.resources.get("tenant").unwrap();
        let names: Vec<&str> = tenant.commands.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["find", "list"]);
    }

    #[test]
    fn test_summarize() {
        let catalog = crate::catalog::tests::tenant_catalog();
        let summary = summarize(&catalog);
        assert_eq!(summary["tenant"], vec!["create", "delete", "find", "list"]);
        assert_eq!(summary["service"], vec!["list", "logs"]);
    }

    #[cfg(all(test, feature = "integration-tests"))]
    mod integration {
        use super::*;

        #[tokio::test]
        async fn test_real_duploctl_discovery() {
            let result = discover_catalog(
                DiscoveryConfig {
                    total_budget: Duration::from_secs(60),
                    ..Default::default()
                },
                vec!["tenant".to_string()],
            )
            .await;
            let tenant = result.catalog.resources.get("tenant");
            assert!(tenant.is_some_and(|t| !t.commands.is_empty()));
        }
    }
}

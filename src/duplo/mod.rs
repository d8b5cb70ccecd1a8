//! Dispatch of duploctl commands.
//!
//! [`Dispatch`] is the seam between the MCP surface and the duploctl
//! executable. [`client::DuploClient`] is the real implementation; tests use
//! recording fakes.

pub mod client;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

pub use client::DuploClient;

/// One duploctl call. Per-call options live here so they never leak into
/// other calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub resource: String,
    pub command: String,
    pub name: Option<String>,
    /// Extra positional arguments and flags, already in argv form.
    pub args: Vec<String>,
    /// Request body, written to duploctl's stdin as JSON.
    pub body: Option<Value>,
    /// JMESPath query applied by duploctl.
    pub query: Option<String>,
    /// Output format override (`json`, `yaml`, `string`).
    pub output: Option<String>,
    pub wait: bool,
}

impl Invocation {
    pub fn new(resource: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    /// `resource_command`, used in logs and errors.
    pub fn target(&self) -> String {
        format!("{}_{}", self.resource, self.command)
    }

    /// duploctl argv, excluding the executable and pass-through flags.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.resource.clone(), self.command.clone()];
        if let Some(name) = &self.name {
            argv.push(name.clone());
        }
        argv.extend(self.args.iter().cloned());
        if self.body.is_some() {
            argv.push("-f".to_string());
            argv.push("-".to_string());
        }
        if let Some(query) = &self.query {
            argv.push("--query".to_string());
            argv.push(query.clone());
        }
        if let Some(output) = &self.output {
            argv.push("--output".to_string());
            argv.push(output.clone());
        }
        if self.wait {
            argv.push("--wait".to_string());
        }
        argv
    }
}

/// Captured result of a finished duploctl process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl DispatchOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Error text for a failed call: stderr, else stdout, else the exit code.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("duploctl exited with code {}", self.exit_code)
    }
}

/// Runs duploctl commands.
pub trait Dispatch: Send + Sync {
    /// duploctl's environment summary (host, tenant, available resources).
    fn environment(&self) -> BoxFuture<'_, crate::Result<Map<String, Value>>>;

    fn dispatch(&self, invocation: Invocation) -> BoxFuture<'_, crate::Result<DispatchOutput>>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_positional() {
        let mut inv = Invocation::new("tenant", "find");
        inv.name = Some("dev01".to_string());
        inv.args = vec!["extra".to_string()];
        assert_eq!(inv.argv(), vec!["tenant", "find", "dev01", "extra"]);
    }

    #[test]
    fn test_argv_body_and_options() {
        let mut inv = Invocation::new("tenant", "create");
        inv.body = Some(serde_json::json!({"AccountName": "dev01"}));
        inv.query = Some("Name".to_string());
        inv.output = Some("yaml".to_string());
        inv.wait = true;
        assert_eq!(
            inv.argv(),
            vec![
                "tenant", "create", "-f", "-", "--query", "Name", "--output", "yaml", "--wait"
            ]
        );
    }

    #[test]
    fn test_target() {
        assert_eq!(Invocation::new("tenant", "list").target(), "tenant_list");
    }

    #[test]
    fn test_failure_message_prefers_stderr() {
        let out = DispatchOutput {
            stdout: "partial".to_string(),
            stderr: "boom\n".to_string(),
            exit_code: 1,
        };
        assert_eq!(out.failure_message(), "boom");

        let out = DispatchOutput {
            exit_code: 2,
            ..Default::default()
        };
        assert_eq!(out.failure_message(), "duploctl exited with code 2");
        assert!(!out.success());
    }
}

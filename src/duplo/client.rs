//! duploctl subprocess client. Spawns duploctl with timeout-kill, feeds
//! request bodies on stdin and captures output.

use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::ServerSettings;
use crate::duplo::{Dispatch, DispatchOutput, Invocation};
use crate::error::DuploMcpError;

/// Runs duploctl via `tokio::process::Command` (never a shell).
///
/// The child inherits the server's environment, so duploctl's own
/// `DUPLO_HOST` / `DUPLO_TOKEN` / `DUPLO_TENANT` binding applies unchanged.
#[derive(Debug, Clone)]
pub struct DuploClient {
    command: String,
    /// Flags appended to every invocation.
    base_args: Vec<String>,
    timeout: Duration,
}

impl DuploClient {
    pub fn new(command: impl Into<String>, base_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            base_args,
            timeout,
        }
    }

    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self::new(
            settings.duploctl.clone(),
            settings.duplo_args.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Spawn duploctl with `argv` plus the pass-through flags.
    ///
    /// Stdout and stderr are drained concurrently with the stdin write;
    /// `tokio::select!` races completion against the timeout and kills the
    /// child when the timeout wins.
    async fn run(
        &self,
        target: &str,
        argv: &[String],
        stdin: Option<Vec<u8>>,
    ) -> crate::Result<DispatchOutput> {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(argv);
        cmd.args(&self.base_args);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            DuploMcpError::Dispatch(
                target.to_string(),
                format!("failed to spawn '{}': {}", self.command, e),
            )
        })?;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let io = async {
            let write_stdin = async {
                if let (Some(mut pipe), Some(bytes)) = (stdin_pipe, stdin) {
                    match pipe.write_all(&bytes).await {
                        Ok(()) => {}
                        // duploctl may exit before reading the body.
                        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                        Err(e) => return Err(e),
                    }
                    // Dropping the pipe closes stdin.
                }
                Ok(())
            };
            let read_stdout = async {
                let mut bytes = Vec::new();
                if let Some(mut out) = stdout_pipe {
                    out.read_to_end(&mut bytes).await?;
                }
                Ok::<_, std::io::Error>(bytes)
            };
            let read_stderr = async {
                let mut bytes = Vec::new();
                if let Some(mut err) = stderr_pipe {
                    err.read_to_end(&mut bytes).await?;
                }
                Ok::<_, std::io::Error>(bytes)
            };
            let (written, stdout, stderr) = tokio::join!(write_stdin, read_stdout, read_stderr);
            written?;
            Ok::<_, std::io::Error>((stdout?, stderr?))
        };

        let (stdout, stderr, status) = tokio::select! {
            result = async {
                let (stdout, stderr) = io.await?;
                let status = child.wait().await?;
                Ok::<_, std::io::Error>((stdout, stderr, status))
            } => {
                result.map_err(|e| DuploMcpError::Dispatch(
                    target.to_string(),
                    format!("process I/O error: {}", e),
                ))?
            }
            _ = tokio::time::sleep(self.timeout) => {
                // Kill the process, not just the future.
                let _ = child.kill().await;
                return Err(DuploMcpError::CallTimeout(target.to_string()));
            }
        };

        let output = DispatchOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code().unwrap_or(-1),
        };

        tracing::info!(
            command = %self.command,
            args = ?argv,
            exit_code = %output.exit_code,
            duration_ms = %start.elapsed().as_millis(),
            "duploctl invocation"
        );
        if !output.stderr.is_empty() {
            tracing::debug!(call = %target, stderr = %output.stderr, "duploctl stderr");
        }

        Ok(output)
    }
}

impl Dispatch for DuploClient {
    /// Runs bare `duploctl --output json`, which prints the connection and
    /// environment summary.
    fn environment(&self) -> BoxFuture<'_, crate::Result<Map<String, Value>>> {
        Box::pin(async move {
            let argv = vec!["--output".to_string(), "json".to_string()];
            let output = self.run("environment", &argv, None).await?;
            if !output.success() {
                return Err(DuploMcpError::Dispatch(
                    "environment".to_string(),
                    output.failure_message(),
                ));
            }
            match serde_json::from_str::<Value>(&output.stdout) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(DuploMcpError::Dispatch(
                    "environment".to_string(),
                    format!("expected a JSON object, got: {}", other),
                )),
                Err(e) => Err(DuploMcpError::Dispatch(
                    "environment".to_string(),
                    format!("invalid JSON from duploctl: {}", e),
                )),
            }
        })
    }

    fn dispatch(&self, invocation: Invocation) -> BoxFuture<'_, crate::Result<DispatchOutput>> {
        Box::pin(async move {
            let target = invocation.target();
            let stdin = match &invocation.body {
                Some(body) => Some(serde_json::to_vec(body).map_err(|e| {
                    DuploMcpError::Dispatch(target.clone(), format!("body encoding failed: {}", e))
                })?),
                None => None,
            };
            self.run(&target, &invocation.argv(), stdin).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_client() -> DuploClient {
        DuploClient::new("echo", vec!["--tenant".to_string(), "dev".to_string()], Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_dispatch_builds_argv() {
        let mut inv = Invocation::new("tenant", "find");
        inv.name = Some("dev01".to_string());
        inv.query = Some("Name".to_string());

        let output = echo_client().dispatch(inv).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "tenant find dev01 --query Name --tenant dev");
    }

    #[tokio::test]
    async fn test_dispatch_body_is_written_to_stdin() {
        // argv becomes `sh -c cat -f -`: the script is `cat`, which copies stdin.
        let client = DuploClient::new("sh", vec![], Duration::from_secs(5));
        let mut inv = Invocation::new("-c", "cat");
        inv.body = Some(serde_json::json!({"AccountName": "dev01"}));

        let output = client.dispatch(inv).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, r#"{"AccountName":"dev01"}"#);
    }

    #[tokio::test]
    async fn test_dispatch_spawn_failure() {
        let client = DuploClient::new(
            "duplocloud-mcp-test-nonexistent-12345",
            vec![],
            Duration::from_secs(5),
        );
        let result = client.dispatch(Invocation::new("tenant", "list")).await;
        assert!(matches!(result, Err(DuploMcpError::Dispatch(t, _)) if t == "tenant_list"));
    }

    #[tokio::test]
    async fn test_dispatch_timeout_kills_child() {
        let client = DuploClient::new("sleep", vec![], Duration::from_millis(200));
        // `sleep 5 list` is invalid; use the resource slot for the duration.
        let result = client.dispatch(Invocation::new("5", "5")).await;
        assert!(matches!(result, Err(DuploMcpError::CallTimeout(t)) if t == "5_5"));
    }

    #[tokio::test]
    async fn test_environment_rejects_non_json() {
        let result = echo_client().environment().await;
        assert!(
            matches!(result, Err(DuploMcpError::Dispatch(t, msg)) if t == "environment" && msg.contains("invalid JSON"))
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = ServerSettings {
            duploctl: "/usr/local/bin/duploctl".to_string(),
            duplo_args: vec!["--host".to_string(), "https://x".to_string()],
            timeout_secs: 42,
            ..Default::default()
        };
        let client = DuploClient::from_settings(&settings);
        assert_eq!(client.command(), "/usr/local/bin/duploctl");
        assert_eq!(client.base_args.len(), 2);
        assert_eq!(client.timeout, Duration::from_secs(42));
    }
}

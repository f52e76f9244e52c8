//! Remote execution boundary
//!
//! Everything in the engine talks to hosts through [`RemoteExecutor`]: one probe
//! against one host pattern, answered with a [`CommandResult`]. Production code
//! uses [`AnsibleExecutor`]; tests use [`FakeExecutor`] with canned responses.

mod ansible;
mod fake;

pub use ansible::{module_args, AnsibleExecutor};
pub use fake::{FakeExecutor, FakeExecutorBuilder, FakeResponse, RecordedCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Highest verbosity the executor understands (`-vvvv`)
pub const MAX_VERBOSITY: u8 = 4;

/// Desired state for a service-control probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Started,
    Stopped,
    Restarted,
    Reloaded,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Started => "started",
            ServiceState::Stopped => "stopped",
            ServiceState::Restarted => "restarted",
            ServiceState::Reloaded => "reloaded",
        }
    }
}

/// One remote operation, with typed arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// Run a command through the remote shell
    ShellCommand { command: String },
    /// Collect host facts, optionally narrowed
    FactsGather {
        subset: Option<String>,
        filter: Option<String>,
    },
    /// Query or change a service; `state: None` only reports status
    ServiceControl {
        name: String,
        state: Option<ServiceState>,
    },
    /// Connectivity check against the managed host itself
    Ping,
}

impl Probe {
    pub fn shell(command: impl Into<String>) -> Self {
        Probe::ShellCommand {
            command: command.into(),
        }
    }

    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            Probe::ShellCommand { command } => format!("shell: {}", command),
            Probe::FactsGather { subset, .. } => {
                format!("facts: {}", subset.as_deref().unwrap_or("all"))
            }
            Probe::ServiceControl { name, state } => format!(
                "service: {} {}",
                name,
                state.map(|s| s.as_str()).unwrap_or("status")
            ),
            Probe::Ping => "ping".to_string(),
        }
    }
}

/// Per-call execution options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Privilege escalation
    pub elevate: bool,
    pub elevate_user: Option<String>,
    pub check_mode: bool,
    pub diff_mode: bool,
    pub verbosity: u8,
}

impl ExecOptions {
    pub fn effective_verbosity(&self) -> u8 {
        self.verbosity.min(MAX_VERBOSITY)
    }
}

/// Result of one probe against one host pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// `exit_code == 0`
    pub ok: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Full command line as handed to the executor backend
    pub command: String,
    #[serde(default)]
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn new(
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            ok: exit_code == 0,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            command: command.into(),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Failed result standing in for a probe that never ran
    pub fn launch_failure(command: impl Into<String>, error: &ExecutorError) -> Self {
        Self::new(-1, String::new(), format!("launch failed: {}", error), command)
    }

    /// Trimmed stdout, or `None` when the probe failed
    pub fn trimmed_stdout(&self) -> Option<&str> {
        if self.ok {
            Some(self.stdout.trim())
        } else {
            None
        }
    }

    /// Non-empty stdout lines with ad-hoc host banners removed
    pub fn payload_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_host_banner(line))
            .collect()
    }
}

/// `web01 | CHANGED | rc=0 >>` and friends
fn is_host_banner(line: &str) -> bool {
    line.ends_with(">>") && line.contains(" | rc=")
}

/// Executor failure that prevented a probe from running at all
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

/// Run a probe against a host pattern
///
/// Implementations must return `Ok` for any remote exit status, including
/// non-zero ones. `Err` is reserved for failures to start or finish the
/// local process.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(
        &self,
        host_pattern: &str,
        probe: &Probe,
        options: &ExecOptions,
    ) -> Result<CommandResult, ExecutorError>;
}

/// Execute a probe, folding launch failures into a failed `CommandResult`
pub async fn run_probe(
    executor: &dyn RemoteExecutor,
    host_pattern: &str,
    probe: &Probe,
    options: &ExecOptions,
) -> CommandResult {
    debug!("[EXEC] {} -> {}", host_pattern, probe.describe());
    match executor.execute(host_pattern, probe, options).await {
        Ok(result) => {
            if !result.ok {
                warn!(
                    "[EXEC] {} exited {} on {}: {}",
                    probe.describe(),
                    result.exit_code,
                    host_pattern,
                    result.stderr.trim()
                );
            }
            result
        }
        Err(e) => {
            warn!("[EXEC] {} could not run on {}: {}", probe.describe(), host_pattern, e);
            CommandResult::launch_failure(probe.describe(), &e)
        }
    }
}

/// Shell-command shorthand for [`run_probe`] with default options
pub async fn run_shell(
    executor: &dyn RemoteExecutor,
    host_pattern: &str,
    command: &str,
) -> CommandResult {
    run_probe(
        executor,
        host_pattern,
        &Probe::shell(command),
        &ExecOptions::default(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenExecutor;

    #[async_trait]
    impl RemoteExecutor for BrokenExecutor {
        async fn execute(
            &self,
            _host_pattern: &str,
            _probe: &Probe,
            _options: &ExecOptions,
        ) -> Result<CommandResult, ExecutorError> {
            Err(ExecutorError::Other("no such binary".to_string()))
        }
    }

    #[test]
    fn test_command_result_ok_tracks_exit_code() {
        assert!(CommandResult::new(0, "x", "", "true").ok);
        assert!(!CommandResult::new(2, "", "boom", "false").ok);
    }

    #[test]
    fn test_payload_lines_drop_host_banners() {
        let result = CommandResult::new(
            0,
            "web01 | CHANGED | rc=0 >>\n42\n\n61.5\n",
            "",
            "ansible web01 -m shell",
        );
        assert_eq!(result.payload_lines(), vec!["42", "61.5"]);
    }

    #[test]
    fn test_verbosity_is_clamped() {
        let opts = ExecOptions {
            verbosity: 9,
            ..Default::default()
        };
        assert_eq!(opts.effective_verbosity(), 4);
    }

    #[tokio::test]
    async fn test_launch_failure_becomes_failed_result() {
        let result = run_shell(&BrokenExecutor, "web", "uptime").await;
        assert!(!result.ok);
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.contains("no such binary"));
        assert_eq!(result.command, "shell: uptime");
    }

    #[test]
    fn test_probe_serializes_with_kind_tag() {
        let json = serde_json::to_value(Probe::shell("uptime")).unwrap();
        assert_eq!(json["kind"], "shell_command");
        assert_eq!(json["command"], "uptime");
    }
}

//! Fake executor for deterministic tests
//!
//! Responses are keyed by a substring of the probe's command text. The first
//! registered key contained in the command wins, so register specific keys
//! before generic ones. Every call is recorded in order.
//!
//! ```rust,ignore
//! let fake = FakeExecutorBuilder::new()
//!     .respond("df -h", FakeResponse::ok("42\n61.5\n12.0\n"))
//!     .build();
//! ```

use super::{CommandResult, ExecOptions, ExecutorError, Probe, RemoteExecutor};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// Pre-configured probe response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// When set, the executor fails to launch instead of answering
    pub launch_error: Option<String>,
}

impl FakeResponse {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            launch_error: None,
        }
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            launch_error: None,
        }
    }

    pub fn launch_error(message: &str) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            launch_error: Some(message.to_string()),
        }
    }
}

/// One observed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub host_pattern: String,
    pub probe: Probe,
    pub options: ExecOptions,
}

impl RecordedCall {
    pub fn command_text(&self) -> String {
        command_text(&self.probe)
    }
}

struct Script {
    needle: String,
    responses: Vec<FakeResponse>,
    served: usize,
}

/// Executor that answers from canned responses
pub struct FakeExecutor {
    scripts: Mutex<Vec<Script>>,
    default_response: FakeResponse,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeExecutor {
    /// Fake where every probe succeeds with empty output
    pub fn new() -> Self {
        FakeExecutorBuilder::new()
            .default_response(FakeResponse::ok(""))
            .build()
    }

    /// Fake where every probe exits non-zero with the given stderr
    pub fn all_failing(stderr: &str) -> Self {
        FakeExecutorBuilder::new()
            .default_response(FakeResponse::fail(1, stderr))
            .build()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Number of calls whose command text contains `needle`
    pub fn call_count(&self, needle: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.command_text().contains(needle))
            .count()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    fn next_response(&self, text: &str) -> FakeResponse {
        let mut scripts = lock(&self.scripts);
        match scripts.iter_mut().find(|s| text.contains(&s.needle)) {
            Some(script) => {
                let idx = script.served.min(script.responses.len().saturating_sub(1));
                script.served += 1;
                script
                    .responses
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| self.default_response.clone())
            }
            None => self.default_response.clone(),
        }
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn execute(
        &self,
        host_pattern: &str,
        probe: &Probe,
        options: &ExecOptions,
    ) -> Result<CommandResult, ExecutorError> {
        let text = command_text(probe);
        lock(&self.calls).push(RecordedCall {
            host_pattern: host_pattern.to_string(),
            probe: probe.clone(),
            options: options.clone(),
        });

        let response = self.next_response(&text);
        if let Some(message) = response.launch_error {
            return Err(ExecutorError::Other(message));
        }
        Ok(CommandResult::new(
            response.exit_code,
            response.stdout,
            response.stderr,
            format!("fake:{}", text),
        ))
    }
}

/// Builder for [`FakeExecutor`]
pub struct FakeExecutorBuilder {
    scripts: Vec<Script>,
    default_response: FakeResponse,
}

impl FakeExecutorBuilder {
    /// Builder whose unknown probes fail with exit 127
    pub fn new() -> Self {
        Self {
            scripts: Vec::new(),
            default_response: FakeResponse::fail(127, "no canned response"),
        }
    }

    /// Answer every probe containing `needle` with `response`
    pub fn respond(self, needle: &str, response: FakeResponse) -> Self {
        self.respond_seq(needle, vec![response])
    }

    /// Answer successive matching probes in order; the last response repeats
    pub fn respond_seq(mut self, needle: &str, responses: Vec<FakeResponse>) -> Self {
        self.scripts.push(Script {
            needle: needle.to_string(),
            responses,
            served: 0,
        });
        self
    }

    pub fn default_response(mut self, response: FakeResponse) -> Self {
        self.default_response = response;
        self
    }

    pub fn build(self) -> FakeExecutor {
        FakeExecutor {
            scripts: Mutex::new(self.scripts),
            default_response: self.default_response,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Default for FakeExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn command_text(probe: &Probe) -> String {
    match probe {
        Probe::ShellCommand { command } => command.clone(),
        other => other.describe(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::run_shell;

    #[tokio::test]
    async fn test_first_matching_needle_wins() {
        let fake = FakeExecutorBuilder::new()
            .respond("free", FakeResponse::ok("mem"))
            .respond("df", FakeResponse::ok("disk"))
            .build();

        assert_eq!(run_shell(&fake, "web", "df -h").await.stdout, "disk");
        assert_eq!(run_shell(&fake, "web", "free -m").await.stdout, "mem");
        assert_eq!(fake.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_probe_uses_default() {
        let fake = FakeExecutorBuilder::new().build();
        let result = run_shell(&fake, "web", "uptime").await;
        assert!(!result.ok);
        assert_eq!(result.exit_code, 127);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let fake = FakeExecutorBuilder::new()
            .respond_seq(
                "loadavg",
                vec![FakeResponse::ok("1"), FakeResponse::ok("2")],
            )
            .build();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(run_shell(&fake, "web", "cat /proc/loadavg").await.stdout);
        }
        assert_eq!(seen, vec!["1", "2", "2"]);
        assert_eq!(fake.call_count("loadavg"), 3);
    }

    #[tokio::test]
    async fn test_launch_error_response() {
        let fake = FakeExecutorBuilder::new()
            .respond("ping", FakeResponse::launch_error("ansible missing"))
            .build();
        let err = fake
            .execute("web", &Probe::Ping, &ExecOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ansible missing"));
    }
}

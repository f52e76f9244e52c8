//! Ansible ad-hoc backend
//!
//! Translates typed probes into `ansible <pattern> -m <module> -a <args>` and
//! captures exit code, stdout and stderr without reinterpreting them.

use super::{CommandResult, ExecOptions, ExecutorError, Probe, RemoteExecutor};
use crate::config::{ExecutorSettings, ProjectDefinition};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum output length to capture per stream, counted from the end
const MAX_OUTPUT_BYTES: usize = 256 * 1024;

/// Host patterns that default to a local connection
const LOCAL_PATTERNS: &[&str] = &["localhost", "127.0.0.1"];

/// Executor that shells out to the `ansible` CLI
#[derive(Debug, Clone)]
pub struct AnsibleExecutor {
    ansible_bin: String,
    inventory: Option<String>,
    connection: Option<String>,
    timeout_secs: u64,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl Default for AnsibleExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsibleExecutor {
    pub fn new() -> Self {
        Self::from_settings(&ExecutorSettings::default())
    }

    pub fn from_settings(settings: &ExecutorSettings) -> Self {
        Self {
            ansible_bin: settings.ansible_bin.clone(),
            inventory: settings.inventory.clone(),
            connection: settings.connection.clone(),
            timeout_secs: settings.timeout_secs,
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Apply a project's inventory, search paths, env and working directory
    pub fn with_project(mut self, project: &ProjectDefinition) -> Self {
        if self.inventory.is_none() {
            self.inventory = project.inventory.clone();
        }
        self.env.extend(project.ansible_env());
        if !project.root.as_os_str().is_empty() {
            self.cwd = Some(project.root.clone());
        }
        self
    }

    pub fn with_inventory(mut self, inventory: impl Into<String>) -> Self {
        self.inventory = Some(inventory.into());
        self
    }

    /// Arguments after the program name, in CLI order
    pub fn build_args(
        &self,
        host_pattern: &str,
        probe: &Probe,
        options: &ExecOptions,
    ) -> Vec<String> {
        let mut args = vec![host_pattern.to_string(), "-m".to_string()];

        match probe {
            Probe::ShellCommand { command } => {
                args.push("shell".to_string());
                args.push("-a".to_string());
                args.push(command.clone());
            }
            Probe::FactsGather { subset, filter } => {
                args.push("setup".to_string());
                let mut pairs = Vec::new();
                if let Some(subset) = subset {
                    pairs.push(("gather_subset", subset.clone()));
                }
                if let Some(filter) = filter {
                    pairs.push(("filter", filter.clone()));
                }
                if !pairs.is_empty() {
                    args.push("-a".to_string());
                    args.push(module_args(&pairs));
                }
            }
            Probe::ServiceControl { name, state } => {
                args.push("systemd".to_string());
                let mut pairs = vec![("name", name.clone())];
                if let Some(state) = state {
                    pairs.push(("state", state.as_str().to_string()));
                }
                args.push("-a".to_string());
                args.push(module_args(&pairs));
            }
            Probe::Ping => args.push("ping".to_string()),
        }

        if let Some(ref inventory) = self.inventory {
            args.push("-i".to_string());
            args.push(inventory.clone());
        }

        let connection = self.connection.clone().or_else(|| {
            LOCAL_PATTERNS
                .contains(&host_pattern)
                .then(|| "local".to_string())
        });
        if let Some(connection) = connection {
            args.push("-c".to_string());
            args.push(connection);
        }

        if options.elevate {
            args.push("--become".to_string());
        }
        if let Some(ref user) = options.elevate_user {
            args.push("--become-user".to_string());
            args.push(user.clone());
        }
        if options.check_mode {
            args.push("--check".to_string());
        }
        if options.diff_mode {
            args.push("--diff".to_string());
        }
        let verbosity = options.effective_verbosity();
        if verbosity > 0 {
            args.push(format!("-{}", "v".repeat(verbosity as usize)));
        }

        args
    }

    /// Shell-joined command line, as reported in `CommandResult::command`
    pub fn command_line(&self, args: &[String]) -> String {
        let words =
            std::iter::once(self.ansible_bin.as_str()).chain(args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

/// Render `key=value` module arguments with shell-quoted values
pub fn module_args(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, shell_words::quote(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl RemoteExecutor for AnsibleExecutor {
    async fn execute(
        &self,
        host_pattern: &str,
        probe: &Probe,
        options: &ExecOptions,
    ) -> Result<CommandResult, ExecutorError> {
        let args = self.build_args(host_pattern, probe, options);
        let command_line = self.command_line(&args);
        debug!("[EXEC] {}", command_line);

        let mut cmd = Command::new(&self.ansible_bin);
        cmd.args(&args)
            .envs(&self.env)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = options.cwd.as_ref().or(self.cwd.as_ref()) {
            cmd.current_dir(cwd);
        }

        let start = Instant::now();
        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| ExecutorError::Timeout(self.timeout_secs))?
            .map_err(|source| ExecutorError::Launch {
                program: self.ansible_bin.clone(),
                source,
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let (stdout, stdout_cut) = tail_output(&output.stdout);
        let (mut stderr, stderr_cut) = tail_output(&output.stderr);
        for (stream, cut) in [("stdout", stdout_cut), ("stderr", stderr_cut)] {
            if cut {
                warn!("[EXEC] {} truncated to last {} bytes", stream, MAX_OUTPUT_BYTES);
                stderr.push_str(&truncation_note(stream));
            }
        }
        Ok(CommandResult::new(exit_code, stdout, stderr, command_line)
            .with_duration(start.elapsed().as_millis() as u64))
    }
}

/// Keep the last `MAX_OUTPUT_BYTES`, starting on a char boundary where the
/// output is valid UTF-8; the flag is set when anything was dropped
fn tail_output(bytes: &[u8]) -> (String, bool) {
    if bytes.len() <= MAX_OUTPUT_BYTES {
        return (String::from_utf8_lossy(bytes).into_owned(), false);
    }
    let mut start = bytes.len() - MAX_OUTPUT_BYTES;
    // skip UTF-8 continuation bytes so the tail does not open mid-char
    while start < bytes.len() && (bytes[start] & 0xC0) == 0x80 {
        start += 1;
    }
    (String::from_utf8_lossy(&bytes[start..]).into_owned(), true)
}

fn truncation_note(stream: &str) -> String {
    format!(
        "\n[{} truncated to last {} bytes]\n",
        stream, MAX_OUTPUT_BYTES
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ServiceState;

    fn args_for(probe: &Probe, host: &str) -> Vec<String> {
        AnsibleExecutor::new().build_args(host, probe, &ExecOptions::default())
    }

    #[test]
    fn test_tail_output_keeps_the_end() {
        let mut bytes = vec![b'.'; MAX_OUTPUT_BYTES * 2];
        bytes.extend_from_slice(b"\nERROR final failure\n");
        let (text, truncated) = tail_output(&bytes);
        assert!(truncated);
        assert_eq!(text.len(), MAX_OUTPUT_BYTES);
        assert!(text.ends_with("ERROR final failure\n"));
    }

    #[test]
    fn test_tail_output_starts_on_char_boundary() {
        // one trailing byte moves the cut into the middle of the first char
        let mut bytes = "é".repeat(MAX_OUTPUT_BYTES / 2).into_bytes();
        bytes.push(b'x');
        let (text, truncated) = tail_output(&bytes);
        assert!(truncated);
        assert!(!text.contains('\u{FFFD}'));
        assert!(text.starts_with('é'));
        assert!(text.ends_with("éx"));
        assert_eq!(text.len(), MAX_OUTPUT_BYTES - 1);
    }

    #[test]
    fn test_short_output_is_untouched() {
        let (text, truncated) = tail_output(b"ok\n");
        assert!(!truncated);
        assert_eq!(text, "ok\n");
        assert!(truncation_note("stdout").contains("stdout truncated"));
    }

    #[test]
    fn test_shell_probe_args() {
        let args = args_for(&Probe::shell("uptime"), "web");
        assert_eq!(args, vec!["web", "-m", "shell", "-a", "uptime"]);
    }

    #[test]
    fn test_localhost_defaults_to_local_connection() {
        let args = args_for(&Probe::Ping, "localhost");
        assert_eq!(args, vec!["localhost", "-m", "ping", "-c", "local"]);
    }

    #[test]
    fn test_service_control_args() {
        let probe = Probe::ServiceControl {
            name: "nginx".to_string(),
            state: Some(ServiceState::Restarted),
        };
        let args = args_for(&probe, "web");
        assert_eq!(args[2], "systemd");
        assert_eq!(args[4], "name=nginx state=restarted");
    }

    #[test]
    fn test_facts_filter_is_quoted() {
        let probe = Probe::FactsGather {
            subset: Some("!all,network".to_string()),
            filter: None,
        };
        let args = args_for(&probe, "db");
        assert_eq!(args[2], "setup");
        assert_eq!(args[4], "gather_subset='!all,network'");
    }

    #[test]
    fn test_options_flags() {
        let exec = AnsibleExecutor::new().with_inventory("hosts.ini");
        let opts = ExecOptions {
            elevate: true,
            elevate_user: Some("postgres".to_string()),
            check_mode: true,
            diff_mode: true,
            verbosity: 7,
            ..Default::default()
        };
        let args = exec.build_args("db", &Probe::Ping, &opts);
        assert!(args.windows(2).any(|w| w == ["-i", "hosts.ini"]));
        assert!(args.contains(&"--become".to_string()));
        assert!(args.windows(2).any(|w| w == ["--become-user", "postgres"]));
        assert!(args.contains(&"--check".to_string()));
        assert!(args.contains(&"--diff".to_string()));
        assert_eq!(args.last().unwrap(), "-vvvv");
    }

    #[test]
    fn test_command_line_quotes_shell_payload() {
        let exec = AnsibleExecutor::new();
        let args = exec.build_args("web", &Probe::shell("df -h /"), &ExecOptions::default());
        assert_eq!(exec.command_line(&args), "ansible web -m shell -a 'df -h /'");
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let settings = ExecutorSettings {
            ansible_bin: "/nonexistent/fleetmedic-ansible".to_string(),
            ..Default::default()
        };
        let exec = AnsibleExecutor::from_settings(&settings);
        let err = exec
            .execute("web", &Probe::Ping, &ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Launch { .. }));
    }
}

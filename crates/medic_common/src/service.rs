//! Remote service management

use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{
    run_probe, run_shell, CommandResult, ExecOptions, Probe, RemoteExecutor, ServiceState,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Journal lines pulled after a service action
const SERVICE_LOG_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Status,
    Start,
    Stop,
    Restart,
    Reload,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Status => "status",
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Reload => "reload",
        }
    }

    /// Target state, `None` for a read-only status query
    pub fn target_state(&self) -> Option<ServiceState> {
        match self {
            ServiceAction::Status => None,
            ServiceAction::Start => Some(ServiceState::Started),
            ServiceAction::Stop => Some(ServiceState::Stopped),
            ServiceAction::Restart => Some(ServiceState::Restarted),
            ServiceAction::Reload => Some(ServiceState::Reloaded),
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceAction {
    type Err = MedicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "status" => Ok(ServiceAction::Status),
            "start" => Ok(ServiceAction::Start),
            "stop" => Ok(ServiceAction::Stop),
            "restart" => Ok(ServiceAction::Restart),
            "reload" => Ok(ServiceAction::Reload),
            other => Err(MedicError::InvalidArgument(format!(
                "unknown service action '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    /// Mirrors the action result
    pub ok: bool,
    pub service: String,
    pub action: ServiceAction,
    pub action_result: CommandResult,
    pub status: CommandResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<CommandResult>,
}

pub struct ServiceManager<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> ServiceManager<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Apply `action`, then report status and optionally recent journal lines
    pub async fn manage(
        &self,
        host_pattern: &str,
        service: &str,
        action: ServiceAction,
        check_logs: bool,
    ) -> Result<ServiceReport> {
        require_host_pattern(host_pattern)?;
        let service = service.trim();
        if service.is_empty() {
            return Err(MedicError::InvalidArgument(
                "service name is required".to_string(),
            ));
        }
        info!("[SERVICE] {} {} on {}", action, service, host_pattern);

        let options = ExecOptions::default();
        let action_result = run_probe(
            self.executor,
            host_pattern,
            &Probe::ServiceControl {
                name: service.to_string(),
                state: action.target_state(),
            },
            &options,
        )
        .await;

        let status = run_probe(
            self.executor,
            host_pattern,
            &Probe::ServiceControl {
                name: service.to_string(),
                state: None,
            },
            &options,
        )
        .await;

        let logs = if check_logs {
            let command = format!(
                "journalctl -u {} -n {} --no-pager",
                shell_words::quote(service),
                SERVICE_LOG_LINES
            );
            Some(run_shell(self.executor, host_pattern, &command).await)
        } else {
            None
        };

        Ok(ServiceReport {
            ok: action_result.ok,
            service: service.to_string(),
            action,
            action_result,
            status,
            logs,
        })
    }
}

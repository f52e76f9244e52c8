//! Impact-gated auto-heal
//!
//! Symptoms map to a fixed catalogue of remediation actions. Planning is pure:
//! actions at or below the impact ceiling are proposed, the rest blocked, and
//! unknown symptom tags are dropped. Execution runs each proposed action's
//! safety check and then its command. The safety check result is recorded
//! but never decides whether the command runs.

use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{run_shell, CommandResult, RemoteExecutor};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symptom {
    HighCpu,
    HighMemory,
    DiskFull,
    ServiceFailed,
}

impl Symptom {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "high_cpu" => Some(Symptom::HighCpu),
            "high_memory" => Some(Symptom::HighMemory),
            "disk_full" => Some(Symptom::DiskFull),
            "service_failed" => Some(Symptom::ServiceFailed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Symptom::HighCpu => "high_cpu",
            Symptom::HighMemory => "high_memory",
            Symptom::DiskFull => "disk_full",
            Symptom::ServiceFailed => "service_failed",
        }
    }
}

/// Potential disruption of an action, ordered low < medium < high
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    #[default]
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
        }
    }
}

impl FromStr for Impact {
    type Err = MedicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Impact::Low),
            "medium" => Ok(Impact::Medium),
            "high" => Ok(Impact::High),
            other => Err(MedicError::InvalidArgument(format!(
                "unknown impact level '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealingAction {
    pub symptom: Symptom,
    pub action_id: &'static str,
    pub impact: Impact,
    pub command: &'static str,
    pub safety_check_command: &'static str,
    pub description: &'static str,
}

/// One row per symptom
pub static CATALOGUE: [HealingAction; 4] = [
    HealingAction {
        symptom: Symptom::HighCpu,
        action_id: "restart_high_cpu_processes",
        impact: Impact::Medium,
        command: "kill -9 $(ps aux --sort=-%cpu | head -6 | tail -5 | awk '{print $2}')",
        safety_check_command: "ps aux --sort=-%cpu | head -6",
        description: "Terminate top 5 CPU-consuming processes",
    },
    HealingAction {
        symptom: Symptom::HighMemory,
        action_id: "clear_cache",
        impact: Impact::Low,
        command: "sync && echo 3 > /proc/sys/vm/drop_caches",
        safety_check_command: "free -m",
        description: "Clear system cache to free memory",
    },
    HealingAction {
        symptom: Symptom::DiskFull,
        action_id: "cleanup_temp_files",
        impact: Impact::Low,
        command: "find /tmp -type f -atime +7 -delete && find /var/log -name '*.log' -size +100M -delete",
        safety_check_command: "df -h",
        description: "Clean up old temporary files and large logs",
    },
    HealingAction {
        symptom: Symptom::ServiceFailed,
        action_id: "restart_failed_services",
        impact: Impact::Medium,
        command: "systemctl reset-failed && systemctl restart $(systemctl --failed --no-legend | awk '{print $1}')",
        safety_check_command: "systemctl --failed",
        description: "Restart all failed services",
    },
];

pub fn action_for(symptom: Symptom) -> &'static HealingAction {
    let row = match symptom {
        Symptom::HighCpu => 0,
        Symptom::HighMemory => 1,
        Symptom::DiskFull => 2,
        Symptom::ServiceFailed => 3,
    };
    &CATALOGUE[row]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealingPlan {
    pub proposed: Vec<&'static HealingAction>,
    pub blocked: Vec<&'static HealingAction>,
    /// Tags with no catalogue entry
    pub ignored: Vec<String>,
}

/// Split symptoms into proposed and blocked actions under `max_impact`
pub fn plan<S: AsRef<str>>(symptoms: &[S], max_impact: Impact) -> HealingPlan {
    let mut result = HealingPlan::default();
    for tag in symptoms {
        let tag = tag.as_ref();
        match Symptom::from_tag(tag) {
            Some(symptom) => {
                let action = action_for(symptom);
                if action.impact <= max_impact {
                    result.proposed.push(action);
                } else {
                    result.blocked.push(action);
                }
            }
            None => {
                debug!("[HEAL] no action for symptom '{}'", tag);
                result.ignored.push(tag.to_string());
            }
        }
    }
    result
}

#[derive(Debug, Clone, Serialize)]
pub struct HealingExecutionResult {
    pub action: &'static HealingAction,
    pub safety_check_result: CommandResult,
    pub healing_result: CommandResult,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealSummary {
    pub total_symptoms: usize,
    pub actionable_symptoms: usize,
    pub executed_actions: usize,
    pub successful_actions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealReport {
    pub ok: bool,
    pub symptoms: Vec<String>,
    pub proposed_actions: Vec<&'static HealingAction>,
    pub blocked_actions: Vec<&'static HealingAction>,
    pub max_impact: Impact,
    pub dry_run: bool,
    /// `None` in dry-run mode
    pub execution_results: Option<Vec<HealingExecutionResult>>,
    pub summary: HealSummary,
}

pub struct AutoHealer<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> AutoHealer<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    pub async fn heal(
        &self,
        host_pattern: &str,
        symptoms: &[String],
        max_impact: Impact,
        dry_run: bool,
    ) -> Result<HealReport> {
        require_host_pattern(host_pattern)?;
        let healing_plan = plan(symptoms, max_impact);

        let execution_results = if dry_run {
            for action in &healing_plan.proposed {
                info!(
                    "[HEAL] [DRY-RUN] would run {} on {}: {}",
                    action.action_id, host_pattern, action.command
                );
            }
            None
        } else {
            let mut results = Vec::with_capacity(healing_plan.proposed.len());
            for &action in &healing_plan.proposed {
                results.push(self.execute_action(host_pattern, action).await);
            }
            Some(results)
        };

        let (executed_actions, successful_actions) = execution_results
            .as_ref()
            .map(|results| (results.len(), results.iter().filter(|r| r.success).count()))
            .unwrap_or((0, 0));

        Ok(HealReport {
            ok: true,
            symptoms: symptoms.to_vec(),
            summary: HealSummary {
                total_symptoms: symptoms.len(),
                actionable_symptoms: healing_plan.proposed.len(),
                executed_actions,
                successful_actions,
            },
            proposed_actions: healing_plan.proposed,
            blocked_actions: healing_plan.blocked,
            max_impact,
            dry_run,
            execution_results,
        })
    }

    async fn execute_action(
        &self,
        host_pattern: &str,
        action: &'static HealingAction,
    ) -> HealingExecutionResult {
        let safety_check_result =
            run_shell(self.executor, host_pattern, action.safety_check_command).await;
        if !safety_check_result.ok {
            warn!(
                "[HEAL] safety check for {} failed on {}, continuing",
                action.action_id, host_pattern
            );
        }

        info!("[HEAL] running {} on {}", action.action_id, host_pattern);
        let healing_result = run_shell(self.executor, host_pattern, action.command).await;
        let success = healing_result.ok;
        info!(
            "[HEAL] {} on {}: {}",
            action.action_id,
            host_pattern,
            if success { "ok" } else { "failed" }
        );

        HealingExecutionResult {
            action,
            safety_check_result,
            healing_result,
            success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FakeExecutor, FakeExecutorBuilder, FakeResponse};

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_catalogue_covers_every_symptom() {
        for symptom in [
            Symptom::HighCpu,
            Symptom::HighMemory,
            Symptom::DiskFull,
            Symptom::ServiceFailed,
        ] {
            assert_eq!(action_for(symptom).symptom, symptom);
            assert_eq!(Symptom::from_tag(symptom.as_str()), Some(symptom));
        }
    }

    #[test]
    fn test_impact_order() {
        assert!(Impact::Low < Impact::Medium);
        assert!(Impact::Medium < Impact::High);
        assert_eq!("MEDIUM".parse::<Impact>().unwrap(), Impact::Medium);
        assert!("extreme".parse::<Impact>().is_err());
    }

    #[test]
    fn test_plan_blocks_above_ceiling() {
        let result = plan(&["high_cpu", "high_memory"], Impact::Low);
        assert_eq!(result.proposed.len(), 1);
        assert_eq!(result.proposed[0].action_id, "clear_cache");
        assert_eq!(result.blocked.len(), 1);
        assert_eq!(result.blocked[0].action_id, "restart_high_cpu_processes");
    }

    #[test]
    fn test_plan_keeps_duplicates_and_ignores_unknown() {
        let result = plan(&["disk_full", "disk_full", "gremlins"], Impact::High);
        assert_eq!(result.proposed.len(), 2);
        assert!(result.blocked.is_empty());
        assert_eq!(result.ignored, vec!["gremlins"]);
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let fake = FakeExecutor::new();
        let report = AutoHealer::new(&fake)
            .heal("web", &tags(&["high_memory", "disk_full"]), Impact::High, true)
            .await
            .unwrap();
        assert_eq!(fake.total_calls(), 0);
        assert!(report.execution_results.is_none());
        assert_eq!(report.summary.actionable_symptoms, 2);
        assert_eq!(report.summary.executed_actions, 0);
    }

    #[tokio::test]
    async fn test_execution_runs_safety_check_then_command() {
        let fake = FakeExecutorBuilder::new()
            .respond("free -m", FakeResponse::fail(1, "free: not found"))
            .respond("drop_caches", FakeResponse::ok(""))
            .build();
        let report = AutoHealer::new(&fake)
            .heal("web", &tags(&["high_memory"]), Impact::Low, false)
            .await
            .unwrap();

        let calls: Vec<String> = fake.calls().iter().map(|c| c.command_text()).collect();
        assert_eq!(
            calls,
            vec![
                "free -m".to_string(),
                "sync && echo 3 > /proc/sys/vm/drop_caches".to_string()
            ]
        );
        let results = report.execution_results.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].safety_check_result.ok);
        assert!(results[0].success);
        assert_eq!(report.summary.successful_actions, 1);
    }

    #[tokio::test]
    async fn test_failed_command_is_recorded() {
        let fake = FakeExecutorBuilder::new()
            .default_response(FakeResponse::ok(""))
            .respond("systemctl restart", FakeResponse::fail(5, "unit not found"))
            .build();
        let report = AutoHealer::new(&fake)
            .heal("web", &tags(&["service_failed"]), Impact::Medium, false)
            .await
            .unwrap();
        let results = report.execution_results.unwrap();
        assert!(!results[0].success);
        assert_eq!(results[0].healing_result.exit_code, 5);
        assert_eq!(report.summary.executed_actions, 1);
        assert_eq!(report.summary.successful_actions, 0);
    }
}

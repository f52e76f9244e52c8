//! Baseline capture and comparison
//!
//! A captured baseline is handed back to the caller and never stored.
//! Comparison therefore has nothing to diff against: it captures the current
//! state and returns a fixed-shape result with placeholder differences and
//! `implemented: false`.

use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{run_shell, CommandResult, RemoteExecutor};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineCategory {
    Configs,
    Processes,
    Network,
    Performance,
}

impl BaselineCategory {
    pub const ALL: [BaselineCategory; 4] = [
        BaselineCategory::Configs,
        BaselineCategory::Processes,
        BaselineCategory::Network,
        BaselineCategory::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineCategory::Configs => "configs",
            BaselineCategory::Processes => "processes",
            BaselineCategory::Network => "network",
            BaselineCategory::Performance => "performance",
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            BaselineCategory::Configs => {
                "uname -a; cat /etc/os-release; systemctl list-units --failed"
            }
            BaselineCategory::Processes => "ps aux --sort=-%cpu | head -20",
            BaselineCategory::Network => "ip addr show; netstat -tuln",
            BaselineCategory::Performance => "vmstat 1 3; iostat -x 1 3",
        }
    }

    fn placeholder_difference(&self) -> &'static str {
        match self {
            BaselineCategory::Configs => "Configuration drift analysis",
            BaselineCategory::Processes => "Process comparison would be performed here",
            BaselineCategory::Network => "Network configuration changes would be detected",
            BaselineCategory::Performance => "Performance regression detection",
        }
    }
}

impl FromStr for BaselineCategory {
    type Err = MedicError;

    fn from_str(s: &str) -> Result<Self> {
        BaselineCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                MedicError::InvalidArgument(format!("unknown baseline category '{}'", s))
            })
    }
}

/// `snapshot_YYYYmmdd_HHMMSS_<8 hex>`
pub fn generate_snapshot_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "snapshot_{}_{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub snapshot_id: String,
    pub name: String,
    pub timestamp: String,
    pub host_pattern: String,
    /// Raw probe result per category
    pub data: BTreeMap<BaselineCategory, CommandResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineCapture {
    pub ok: bool,
    pub snapshot_id: String,
    pub name: String,
    pub categories_captured: Vec<BaselineCategory>,
    pub timestamp: String,
    pub baseline_data: Baseline,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonSummary {
    pub changes_detected: usize,
    pub critical_changes: usize,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub baseline_id: String,
    pub current_snapshot: String,
    pub timestamp: String,
    /// Always false: there is no stored baseline to diff against
    pub implemented: bool,
    pub differences: BTreeMap<BaselineCategory, String>,
    pub summary: ComparisonSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateComparison {
    pub ok: bool,
    pub comparison: Comparison,
    pub current_state: BaselineCapture,
}

pub struct BaselineManager<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> BaselineManager<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Snapshot the selected categories (all when empty)
    pub async fn capture(
        &self,
        host_pattern: &str,
        snapshot_name: &str,
        include: &[BaselineCategory],
    ) -> Result<BaselineCapture> {
        require_host_pattern(host_pattern)?;
        if snapshot_name.trim().is_empty() {
            return Err(MedicError::InvalidArgument(
                "snapshot name is required".to_string(),
            ));
        }

        let categories: Vec<BaselineCategory> = if include.is_empty() {
            BaselineCategory::ALL.to_vec()
        } else {
            include
                .iter()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };

        let snapshot_id = generate_snapshot_id();
        info!(
            "[BASELINE] capturing {} ({}) on {}",
            snapshot_name, snapshot_id, host_pattern
        );

        let mut data = BTreeMap::new();
        for category in &categories {
            let result = run_shell(self.executor, host_pattern, category.command()).await;
            data.insert(*category, result);
        }

        let timestamp = crate::timestamp_now();
        Ok(BaselineCapture {
            ok: true,
            snapshot_id: snapshot_id.clone(),
            name: snapshot_name.to_string(),
            categories_captured: categories,
            timestamp: timestamp.clone(),
            baseline_data: Baseline {
                snapshot_id,
                name: snapshot_name.to_string(),
                timestamp,
                host_pattern: host_pattern.to_string(),
                data,
            },
        })
    }

    /// Capture the current state and report against `baseline_id`
    pub async fn compare(
        &self,
        host_pattern: &str,
        baseline_id: &str,
        current_name: Option<&str>,
    ) -> Result<StateComparison> {
        if baseline_id.trim().is_empty() {
            return Err(MedicError::InvalidArgument(
                "baseline snapshot id is required".to_string(),
            ));
        }
        let current_name = current_name
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("current_{}", Local::now().format("%H%M%S")));

        let current_state = self.capture(host_pattern, &current_name, &[]).await?;
        let differences = BaselineCategory::ALL
            .into_iter()
            .map(|c| (c, c.placeholder_difference().to_string()))
            .collect();

        Ok(StateComparison {
            ok: current_state.ok,
            comparison: Comparison {
                baseline_id: baseline_id.to_string(),
                current_snapshot: current_state.snapshot_id.clone(),
                timestamp: crate::timestamp_now(),
                implemented: false,
                differences,
                summary: ComparisonSummary {
                    changes_detected: 0,
                    critical_changes: 0,
                    recommendations: vec![
                        "Comparison analysis would generate recommendations here".to_string(),
                    ],
                },
            },
            current_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FakeExecutor;
    use regex::Regex;

    #[test]
    fn test_snapshot_id_format() {
        let id = generate_snapshot_id();
        let re = Regex::new(r"^snapshot_\d{8}_\d{6}_[0-9a-f]{8}$").unwrap();
        assert!(re.is_match(&id), "unexpected id {}", id);
        assert_ne!(id, generate_snapshot_id());
    }

    #[tokio::test]
    async fn test_capture_selected_categories() {
        let fake = FakeExecutor::new();
        let capture = BaselineManager::new(&fake)
            .capture(
                "web",
                "pre-upgrade",
                &[BaselineCategory::Processes, BaselineCategory::Processes],
            )
            .await
            .unwrap();
        assert_eq!(capture.categories_captured, vec![BaselineCategory::Processes]);
        assert_eq!(fake.total_calls(), 1);
        assert_eq!(fake.call_count("ps aux --sort=-%cpu"), 1);
        assert_eq!(capture.baseline_data.snapshot_id, capture.snapshot_id);
    }

    #[tokio::test]
    async fn test_capture_requires_name() {
        let fake = FakeExecutor::new();
        let err = BaselineManager::new(&fake)
            .capture("web", " ", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_compare_is_placeholder() {
        let fake = FakeExecutor::new();
        let result = BaselineManager::new(&fake)
            .compare("web", "snapshot_20240101_000000_deadbeef", None)
            .await
            .unwrap();
        assert!(result.ok);
        assert!(!result.comparison.implemented);
        assert_eq!(result.comparison.summary.changes_detected, 0);
        assert_eq!(
            result.comparison.differences[&BaselineCategory::Configs],
            "Configuration drift analysis"
        );
        assert!(result.current_state.name.starts_with("current_"));
        assert_eq!(fake.total_calls(), 4);
    }
}

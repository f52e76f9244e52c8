//! Host diagnosis
//!
//! Runs the selected check categories one probe at a time. A failed or
//! unparseable probe turns only its own category into an error marker; the
//! diagnosis as a whole always succeeds once the host pattern is accepted.

use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{run_shell, CommandResult, RemoteExecutor};
use crate::health::{
    HealthAssessment, HealthScorer, MetricValue, MetricsBag, CPU_PERCENT, DISK_USAGE_PERCENT,
    MEMORY_PERCENT, NETWORK_REACHABLE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::{debug, info};

const SYSTEM_PROBE: &str = "df -h / | tail -1 | awk '{print $5}' | sed 's/%//'; free | grep Mem | awk '{print ($3/$2)*100}'; top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | sed 's/%us,//'";
const NETWORK_PROBE: &str =
    "ping -c 3 8.8.8.8 > /dev/null 2>&1 && echo 'reachable' || echo 'unreachable'";
const SECURITY_PROBE: &str = "last -n 5 | grep -v 'wtmp begins' | wc -l; ps aux | grep -v grep | grep -E '(ssh|telnet|ftp)' | wc -l";
const PERFORMANCE_PROBE: &str = "uptime | awk '{print $(NF-2), $(NF-1), $NF}' | tr -d ','";

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCheck {
    System,
    Network,
    Security,
    Performance,
}

impl DiagnosticCheck {
    pub const ALL: [DiagnosticCheck; 4] = [
        DiagnosticCheck::System,
        DiagnosticCheck::Network,
        DiagnosticCheck::Security,
        DiagnosticCheck::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCheck::System => "system",
            DiagnosticCheck::Network => "network",
            DiagnosticCheck::Security => "security",
            DiagnosticCheck::Performance => "performance",
        }
    }
}

impl FromStr for DiagnosticCheck {
    type Err = MedicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(DiagnosticCheck::System),
            "network" => Ok(DiagnosticCheck::Network),
            "security" => Ok(DiagnosticCheck::Security),
            "performance" => Ok(DiagnosticCheck::Performance),
            other => Err(MedicError::InvalidArgument(format!(
                "unknown check '{}'",
                other
            ))),
        }
    }
}

/// Metrics for one category, or why there are none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckOutcome {
    Metrics(MetricsBag),
    Error { error: String },
}

impl CheckOutcome {
    fn error(message: &str) -> Self {
        CheckOutcome::Error {
            error: message.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CheckOutcome::Error { .. })
    }

    pub fn metrics(&self) -> Option<&MetricsBag> {
        match self {
            CheckOutcome::Metrics(bag) => Some(bag),
            CheckOutcome::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub timestamp: String,
    pub checks: BTreeMap<DiagnosticCheck, CheckOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_score: Option<HealthAssessment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReport {
    pub ok: bool,
    pub diagnosis: Diagnosis,
    pub host_pattern: String,
    pub timestamp: String,
}

/// Parse `disk / memory / cpu` lines; the disk line is required, missing
/// trailing lines read as zero
pub fn parse_system_metrics(lines: &[&str]) -> Option<MetricsBag> {
    if lines.is_empty() {
        return None;
    }
    let field = |idx: usize| -> Option<f64> {
        match lines.get(idx) {
            Some(raw) => raw.trim().parse::<f64>().ok(),
            None => Some(0.0),
        }
    };
    Some(
        MetricsBag::new()
            .with_number(DISK_USAGE_PERCENT, field(0)?)
            .with_number(MEMORY_PERCENT, field(1)?)
            .with_number(CPU_PERCENT, field(2)?),
    )
}

pub struct DiagnosticOrchestrator<'a> {
    executor: &'a dyn RemoteExecutor,
    scorer: HealthScorer,
}

impl<'a> DiagnosticOrchestrator<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self {
            executor,
            scorer: HealthScorer::new(),
        }
    }

    /// Diagnose `host_pattern`; an empty `checks` runs every category
    pub async fn diagnose(
        &self,
        host_pattern: &str,
        checks: &[DiagnosticCheck],
        include_recommendations: bool,
    ) -> Result<DiagnosisReport> {
        require_host_pattern(host_pattern)?;

        let selected: BTreeSet<DiagnosticCheck> = if checks.is_empty() {
            DiagnosticCheck::ALL.into_iter().collect()
        } else {
            checks.iter().copied().collect()
        };
        info!(
            "[DIAG] {} on {}",
            selected
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(","),
            host_pattern
        );

        let timestamp = crate::timestamp_now();
        let mut outcomes = BTreeMap::new();
        for check in selected {
            let outcome = self.run_check(host_pattern, check).await;
            if let CheckOutcome::Error { ref error } = outcome {
                debug!("[DIAG] {} degraded: {}", check.as_str(), error);
            }
            outcomes.insert(check, outcome);
        }

        let health_score = include_recommendations.then(|| {
            let mut merged = MetricsBag::new();
            for bag in outcomes.values().filter_map(CheckOutcome::metrics) {
                merged.merge(bag);
            }
            self.scorer.score(&merged)
        });

        Ok(DiagnosisReport {
            ok: true,
            diagnosis: Diagnosis {
                timestamp: timestamp.clone(),
                checks: outcomes,
                health_score,
            },
            host_pattern: host_pattern.to_string(),
            timestamp,
        })
    }

    async fn run_check(&self, host_pattern: &str, check: DiagnosticCheck) -> CheckOutcome {
        match check {
            DiagnosticCheck::System => {
                let result = self.probe(host_pattern, SYSTEM_PROBE).await;
                if !result.ok {
                    return CheckOutcome::error("Failed to gather system metrics");
                }
                match parse_system_metrics(&result.payload_lines()) {
                    Some(bag) => CheckOutcome::Metrics(bag),
                    None => CheckOutcome::error("Failed to parse system metrics"),
                }
            }
            DiagnosticCheck::Network => {
                let result = self.probe(host_pattern, NETWORK_PROBE).await;
                let reachable = result.ok && result.payload_lines().last() == Some(&"reachable");
                CheckOutcome::Metrics(MetricsBag::new().with_flag(NETWORK_REACHABLE, reachable))
            }
            DiagnosticCheck::Security => {
                let result = self.probe(host_pattern, SECURITY_PROBE).await;
                let lines = if result.ok {
                    result.payload_lines()
                } else {
                    Vec::new()
                };
                let mut bag = MetricsBag::new();
                bag.insert(
                    "recent_logins",
                    MetricValue::Text(lines.first().copied().unwrap_or(UNKNOWN).to_string()),
                );
                bag.insert(
                    "network_services",
                    MetricValue::Text(lines.get(1).copied().unwrap_or(UNKNOWN).to_string()),
                );
                CheckOutcome::Metrics(bag)
            }
            DiagnosticCheck::Performance => {
                let result = self.probe(host_pattern, PERFORMANCE_PROBE).await;
                let load = if result.ok {
                    result.payload_lines().join(" ")
                } else {
                    UNKNOWN.to_string()
                };
                CheckOutcome::Metrics(MetricsBag::new().with_text("load_average", &load))
            }
        }
    }

    async fn probe(&self, host_pattern: &str, command: &str) -> CommandResult {
        run_shell(self.executor, host_pattern, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FakeExecutor, FakeExecutorBuilder, FakeResponse};
    use crate::health::HealthLevel;

    fn healthy_fake() -> FakeExecutor {
        FakeExecutorBuilder::new()
            .respond("df -h /", FakeResponse::ok("42\n61.5\n12.0\n"))
            .respond("ping -c 3", FakeResponse::ok("reachable\n"))
            .respond("last -n 5", FakeResponse::ok("5\n2\n"))
            .respond("uptime", FakeResponse::ok("0.15 0.20 0.18\n"))
            .build()
    }

    #[test]
    fn test_parse_system_metrics() {
        let bag = parse_system_metrics(&["42", "61.5", "12.0"]).unwrap();
        assert_eq!(bag.number(DISK_USAGE_PERCENT), 42.0);
        assert_eq!(bag.number(MEMORY_PERCENT), 61.5);
        assert_eq!(bag.number(CPU_PERCENT), 12.0);

        let short = parse_system_metrics(&["42"]).unwrap();
        assert_eq!(short.number(CPU_PERCENT), 0.0);

        assert!(parse_system_metrics(&["42", "n/a"]).is_none());
        assert!(parse_system_metrics(&[]).is_none());
    }

    #[tokio::test]
    async fn test_full_diagnosis() {
        let fake = healthy_fake();
        let report = DiagnosticOrchestrator::new(&fake)
            .diagnose("web", &[], true)
            .await
            .unwrap();

        assert!(report.ok);
        assert_eq!(report.diagnosis.checks.len(), 4);
        assert_eq!(fake.total_calls(), 4);
        let health = report.diagnosis.health_score.unwrap();
        assert_eq!(health.score, 100);
        assert_eq!(health.level, HealthLevel::Healthy);
    }

    #[tokio::test]
    async fn test_failed_system_probe_degrades_only_system() {
        let fake = FakeExecutorBuilder::new()
            .respond("df -h /", FakeResponse::fail(2, "boom"))
            .respond("ping -c 3", FakeResponse::ok("unreachable\n"))
            .build();
        let report = DiagnosticOrchestrator::new(&fake)
            .diagnose(
                "web",
                &[DiagnosticCheck::System, DiagnosticCheck::Network],
                true,
            )
            .await
            .unwrap();

        let system = &report.diagnosis.checks[&DiagnosticCheck::System];
        assert_eq!(
            system,
            &CheckOutcome::Error {
                error: "Failed to gather system metrics".to_string()
            }
        );
        let health = report.diagnosis.health_score.unwrap();
        assert_eq!(health.score, 80);
        assert_eq!(health.issues, vec!["Network connectivity issues"]);
    }

    #[tokio::test]
    async fn test_unparseable_system_output() {
        let fake = FakeExecutorBuilder::new()
            .respond("df -h /", FakeResponse::ok("garbage\n"))
            .build();
        let report = DiagnosticOrchestrator::new(&fake)
            .diagnose("web", &[DiagnosticCheck::System], false)
            .await
            .unwrap();
        assert!(report.diagnosis.checks[&DiagnosticCheck::System].is_error());
        assert!(report.diagnosis.health_score.is_none());
    }

    #[tokio::test]
    async fn test_empty_system_output_is_not_healthy() {
        let fake = FakeExecutorBuilder::new()
            .respond("df -h /", FakeResponse::ok("web | CHANGED | rc=0 >>\n\n"))
            .build();
        let report = DiagnosticOrchestrator::new(&fake)
            .diagnose("web", &[DiagnosticCheck::System], true)
            .await
            .unwrap();
        let system = &report.diagnosis.checks[&DiagnosticCheck::System];
        assert!(system.is_error());
        assert!(system.metrics().is_none());
    }

    #[tokio::test]
    async fn test_security_and_performance_fall_back_to_unknown() {
        let fake = FakeExecutor::all_failing("unreachable");
        let report = DiagnosticOrchestrator::new(&fake)
            .diagnose(
                "web",
                &[DiagnosticCheck::Security, DiagnosticCheck::Performance],
                false,
            )
            .await
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["diagnosis"]["checks"]["security"]["recent_logins"], "unknown");
        assert_eq!(json["diagnosis"]["checks"]["performance"]["load_average"], "unknown");
    }

    #[tokio::test]
    async fn test_empty_host_pattern_is_rejected() {
        let fake = FakeExecutor::new();
        let err = DiagnosticOrchestrator::new(&fake)
            .diagnose("", &[], true)
            .await
            .unwrap_err();
        assert!(matches!(err, MedicError::MissingHostPattern));
        assert_eq!(fake.total_calls(), 0);
    }
}

//! End-to-end checks of the engine through its public API

use medic_common::auto_heal::{plan, AutoHealer, Impact};
use medic_common::correlation::{scan_matches, EventCorrelator};
use medic_common::executor::FakeExecutor;
use medic_common::health::{
    HealthLevel, HealthScorer, MetricsBag, CPU_PERCENT, DISK_USAGE_PERCENT, FAILED_SERVICES,
    MEMORY_PERCENT, NETWORK_REACHABLE,
};
use medic_common::log_patterns::{LogCategory, LogPatternAnalyzer, RECENT_ERRORS_CAP};
use medic_common::security::{score_findings, AuditCategory, SecurityAuditor};

fn bags() -> Vec<MetricsBag> {
    let mut bags = vec![MetricsBag::new()];
    for cpu in [0.0, 50.0, 85.0, 99.0] {
        for mem in [10.0, 90.0, 100.0] {
            for disk in [20.0, 95.0] {
                for failed in [&[][..], &["nginx.service"][..]] {
                    for reachable in [true, false] {
                        bags.push(
                            MetricsBag::new()
                                .with_number(CPU_PERCENT, cpu)
                                .with_number(MEMORY_PERCENT, mem)
                                .with_number(DISK_USAGE_PERCENT, disk)
                                .with_list(FAILED_SERVICES, failed)
                                .with_flag(NETWORK_REACHABLE, reachable),
                        );
                    }
                }
            }
        }
    }
    bags
}

#[test]
fn health_score_is_pure_and_bounded() {
    let scorer = HealthScorer::new();
    for bag in bags() {
        let first = scorer.score(&bag);
        assert_eq!(first, scorer.score(&bag));
        assert!(first.score <= 100);
    }
}

#[test]
fn health_level_follows_score_bands() {
    let scorer = HealthScorer::new();
    for bag in bags() {
        let assessment = scorer.score(&bag);
        let expected = if assessment.score < 50 {
            HealthLevel::Critical
        } else if assessment.score < 80 {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        };
        assert_eq!(assessment.level, expected, "score {}", assessment.score);
    }
}

#[test]
fn empty_log_analysis_is_all_zero() {
    let analysis = LogPatternAnalyzer::new().analyze("");
    assert_eq!(analysis.total_lines_analyzed, 0);
    assert_eq!(analysis.error_rate_percent, 0.0);
    assert_eq!(analysis.category_counts.len(), LogCategory::ALL.len());
    assert!(analysis.category_counts.values().all(|&c| c == 0));
}

#[test]
fn two_close_errors_form_one_cluster() {
    let text = "2024-01-01 10:00:00 ERROR disk full\n2024-01-01 10:00:05 ERROR disk full\n";
    let matches = scan_matches("/var/log/syslog", "ERROR|CRITICAL|FATAL", text).unwrap();
    assert_eq!(matches.len(), 2);
    assert!(matches
        .iter()
        .all(|m| m.category == Some(LogCategory::Error)));

    let report = EventCorrelator::new(10).correlate(&matches);
    assert_eq!(report.correlations.len(), 1);
    assert_eq!(report.correlations[0].strength, 2);
}

#[tokio::test]
async fn impact_ceiling_blocks_medium_actions() {
    let fake = FakeExecutor::new();
    let symptoms = vec!["high_cpu".to_string()];

    let low = AutoHealer::new(&fake)
        .heal("web", &symptoms, Impact::Low, true)
        .await
        .unwrap();
    assert!(low.proposed_actions.is_empty());
    assert_eq!(low.blocked_actions.len(), 1);

    let medium = AutoHealer::new(&fake)
        .heal("web", &symptoms, Impact::Medium, true)
        .await
        .unwrap();
    assert_eq!(medium.proposed_actions.len(), 1);
    assert!(medium.blocked_actions.is_empty());
    assert!(medium.execution_results.is_none());
    assert_eq!(fake.total_calls(), 0);
}

#[tokio::test]
async fn unknown_symptoms_are_dropped() {
    let fake = FakeExecutor::new();
    let report = AutoHealer::new(&fake)
        .heal("web", &["unknown_symptom".to_string()], Impact::High, true)
        .await
        .unwrap();
    assert!(report.proposed_actions.is_empty());
    assert!(report.blocked_actions.is_empty());
    assert_eq!(report.summary.total_symptoms, 1);
    assert_eq!(report.summary.actionable_symptoms, 0);
}

#[tokio::test]
async fn audit_scoring_is_deterministic() {
    let fake = FakeExecutor::new();
    let auditor = SecurityAuditor::new(&fake);
    let first = auditor.audit("web", &[], true).await.unwrap();
    let second = auditor.audit("web", &[], true).await.unwrap();

    assert_eq!(first.categories, second.categories);
    assert_eq!(first.security_assessment, second.security_assessment);
    assert_eq!(
        first.security_assessment,
        Some(score_findings(&first.categories))
    );
    assert_eq!(first.categories.len(), AuditCategory::ALL.len());
}

#[test]
fn raising_impact_never_shrinks_proposals() {
    let symptoms = ["high_cpu", "high_memory", "disk_full", "service_failed", "bogus"];
    let ladder = [Impact::Low, Impact::Medium, Impact::High];
    for window in ladder.windows(2) {
        let lower = plan(&symptoms, window[0]);
        let higher = plan(&symptoms, window[1]);
        assert!(lower.proposed.len() <= higher.proposed.len());
        for action in &lower.proposed {
            assert!(higher.proposed.contains(action));
        }
    }
}

#[test]
fn recent_errors_capped_and_ordered() {
    let text: String = (0..25)
        .map(|i| format!("line {:02} ERROR something broke\n", i))
        .collect();
    let analysis = LogPatternAnalyzer::new().analyze(&text);

    assert_eq!(analysis.recent_errors.len(), RECENT_ERRORS_CAP);
    let expected: Vec<String> = (15..25)
        .map(|i| format!("line {:02} ERROR something broke", i))
        .collect();
    assert_eq!(analysis.recent_errors, expected);
}

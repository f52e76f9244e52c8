//! Security audit
//!
//! Each category runs a fixed set of shell probes whose stdout ends in a count.
//! Counts that cannot be read are treated as zero; the failed probe result is
//! kept on the finding. Scoring is a pure function of the parsed counters.

use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{run_shell, CommandResult, RemoteExecutor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::{debug, info};

pub const SECURITY_UPDATES: &str = "security_updates_available";
pub const TOTAL_UPDATES: &str = "total_updates_available";
pub const SUID_SGID_FILES: &str = "suid_sgid_files";
pub const WORLD_WRITABLE_FILES: &str = "world_writable_files";
pub const OPEN_PORTS: &str = "open_ports";
pub const INSECURE_SERVICES: &str = "insecure_services";
pub const SSH_CONFIG: &str = "ssh_config";
pub const PASSWORD_POLICIES: &str = "password_policies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Packages,
    Permissions,
    Network,
    Config,
}

impl AuditCategory {
    pub const ALL: [AuditCategory; 4] = [
        AuditCategory::Packages,
        AuditCategory::Permissions,
        AuditCategory::Network,
        AuditCategory::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Packages => "packages",
            AuditCategory::Permissions => "permissions",
            AuditCategory::Network => "network",
            AuditCategory::Config => "config",
        }
    }

    fn probes(&self) -> &'static [AuditProbe] {
        match self {
            AuditCategory::Packages => PACKAGE_PROBES,
            AuditCategory::Permissions => PERMISSION_PROBES,
            AuditCategory::Network => NETWORK_PROBES,
            AuditCategory::Config => CONFIG_PROBES,
        }
    }
}

impl FromStr for AuditCategory {
    type Err = MedicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "packages" => Ok(AuditCategory::Packages),
            "permissions" => Ok(AuditCategory::Permissions),
            "network" => Ok(AuditCategory::Network),
            "config" => Ok(AuditCategory::Config),
            other => Err(MedicError::InvalidArgument(format!(
                "unknown audit category '{}'",
                other
            ))),
        }
    }
}

/// How a probe's stdout is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reading {
    Count,
    Text,
}

#[derive(Debug)]
struct AuditProbe {
    key: &'static str,
    command: &'static str,
    reading: Reading,
}

const PACKAGE_PROBES: &[AuditProbe] = &[
    AuditProbe {
        key: SECURITY_UPDATES,
        command: "apt list --upgradable 2>/dev/null | grep -E '(security|CVE)' | wc -l || yum check-update --security 2>/dev/null | grep -c 'needed for security' || echo '0'",
        reading: Reading::Count,
    },
    AuditProbe {
        key: TOTAL_UPDATES,
        command: "apt list --upgradable 2>/dev/null | wc -l || yum check-update 2>/dev/null | wc -l",
        reading: Reading::Count,
    },
];

const PERMISSION_PROBES: &[AuditProbe] = &[
    AuditProbe {
        key: SUID_SGID_FILES,
        command: "find /usr /bin /sbin -perm -4000 -o -perm -2000 2>/dev/null | wc -l",
        reading: Reading::Count,
    },
    AuditProbe {
        key: WORLD_WRITABLE_FILES,
        command: "find / -maxdepth 3 -perm -002 -type f 2>/dev/null | grep -v '/proc\\|/sys\\|/dev' | wc -l",
        reading: Reading::Count,
    },
];

const NETWORK_PROBES: &[AuditProbe] = &[
    AuditProbe {
        key: OPEN_PORTS,
        command: "netstat -tuln | grep LISTEN | wc -l",
        reading: Reading::Count,
    },
    AuditProbe {
        key: INSECURE_SERVICES,
        command: "systemctl list-units --type=service --state=running | grep -E '(telnet|ftp|rsh|rlogin)' | wc -l",
        reading: Reading::Count,
    },
];

const CONFIG_PROBES: &[AuditProbe] = &[
    AuditProbe {
        key: SSH_CONFIG,
        command: "grep -E '^PermitRootLogin|^PasswordAuthentication|^Protocol' /etc/ssh/sshd_config 2>/dev/null || echo 'SSH config not accessible'",
        reading: Reading::Text,
    },
    AuditProbe {
        key: PASSWORD_POLICIES,
        command: "grep -E '^PASS_MAX_DAYS|^PASS_MIN_DAYS|^PASS_WARN_AGE' /etc/login.defs 2>/dev/null | wc -l",
        reading: Reading::Count,
    },
];

/// Last whitespace-separated token of `stdout` that parses as a count
pub fn parse_trailing_count(stdout: &str) -> Option<u64> {
    stdout
        .split_whitespace()
        .rev()
        .find_map(|token| token.parse::<u64>().ok())
}

/// Counters and notes gathered for one category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub counters: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, String>,
    /// Probes that exited non-zero, as returned
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, CommandResult>,
}

impl SecurityFinding {
    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub fn with_counter(mut self, key: &str, value: u64) -> Self {
        self.counters.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Good,
    Warning,
    Critical,
}

impl SecurityLevel {
    pub fn from_score(score: u8) -> Self {
        if score < 40 {
            SecurityLevel::Critical
        } else if score < 70 {
            SecurityLevel::Warning
        } else {
            SecurityLevel::Good
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub score: u8,
    pub level: SecurityLevel,
    pub recommendations: Vec<String>,
}

/// Score a set of findings; categories absent from the map deduct nothing
pub fn score_findings(findings: &BTreeMap<AuditCategory, SecurityFinding>) -> SecurityAssessment {
    let mut score: i64 = 100;
    let mut recommendations = Vec::new();

    for (category, finding) in findings {
        match category {
            AuditCategory::Packages => {
                let updates = finding.counter(SECURITY_UPDATES);
                if updates > 0 {
                    score -= updates.saturating_mul(5).min(30) as i64;
                    recommendations.push(format!("Apply {} security updates immediately", updates));
                }
            }
            AuditCategory::Permissions => {
                let writable = finding.counter(WORLD_WRITABLE_FILES);
                if writable > 0 {
                    score -= writable.saturating_mul(2).min(20) as i64;
                    recommendations.push(format!("Fix {} world-writable files", writable));
                }
            }
            AuditCategory::Network => {
                let insecure = finding.counter(INSECURE_SERVICES);
                if insecure > 0 {
                    let penalty = i64::try_from(insecure.saturating_mul(15)).unwrap_or(i64::MAX);
                    score = score.saturating_sub(penalty);
                    recommendations.push("Disable insecure network services".to_string());
                }
            }
            AuditCategory::Config => {}
        }
    }

    let score = score.clamp(0, 100) as u8;
    SecurityAssessment {
        score,
        level: SecurityLevel::from_score(score),
        recommendations,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityAudit {
    pub ok: bool,
    pub host_pattern: String,
    pub timestamp: String,
    pub categories: BTreeMap<AuditCategory, SecurityFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_assessment: Option<SecurityAssessment>,
}

/// Runs category probes and scores what they report
pub struct SecurityAuditor<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> SecurityAuditor<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Audit the selected categories (all four when empty)
    pub async fn audit(
        &self,
        host_pattern: &str,
        categories: &[AuditCategory],
        generate_report: bool,
    ) -> Result<SecurityAudit> {
        require_host_pattern(host_pattern)?;

        let selected: BTreeSet<AuditCategory> = if categories.is_empty() {
            AuditCategory::ALL.into_iter().collect()
        } else {
            categories.iter().copied().collect()
        };
        info!("[AUDIT] {} categories on {}", selected.len(), host_pattern);

        let mut findings = BTreeMap::new();
        for category in selected {
            let finding = self.audit_category(host_pattern, category).await;
            findings.insert(category, finding);
        }

        let security_assessment = generate_report.then(|| score_findings(&findings));
        if let Some(ref assessment) = security_assessment {
            info!(
                "[AUDIT] {} scored {} ({:?})",
                host_pattern, assessment.score, assessment.level
            );
        }

        Ok(SecurityAudit {
            ok: true,
            host_pattern: host_pattern.to_string(),
            timestamp: crate::timestamp_now(),
            categories: findings,
            security_assessment,
        })
    }

    async fn audit_category(&self, host_pattern: &str, category: AuditCategory) -> SecurityFinding {
        let mut finding = SecurityFinding::default();
        for probe in category.probes() {
            let result = run_shell(self.executor, host_pattern, probe.command).await;
            match probe.reading {
                Reading::Count => {
                    let count = result
                        .trimmed_stdout()
                        .and_then(parse_trailing_count)
                        .unwrap_or(0);
                    debug!("[AUDIT] {}.{} = {}", category.as_str(), probe.key, count);
                    finding.counters.insert(probe.key.to_string(), count);
                }
                Reading::Text => {
                    finding
                        .notes
                        .insert(probe.key.to_string(), result.stdout.trim().to_string());
                }
            }
            if !result.ok {
                finding.failures.insert(probe.key.to_string(), result);
            }
        }
        finding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn findings(pairs: &[(AuditCategory, &str, u64)]) -> BTreeMap<AuditCategory, SecurityFinding> {
        let mut map: BTreeMap<AuditCategory, SecurityFinding> = BTreeMap::new();
        for (category, key, value) in pairs {
            let entry = map.entry(*category).or_default();
            entry.counters.insert(key.to_string(), *value);
        }
        map
    }

    #[test]
    fn test_parse_trailing_count() {
        assert_eq!(parse_trailing_count("web | CHANGED | rc=0 >>\n12"), Some(12));
        assert_eq!(parse_trailing_count("  7\n"), Some(7));
        assert_eq!(parse_trailing_count("no numbers"), None);
        assert_eq!(parse_trailing_count(""), None);
    }

    #[test]
    fn test_clean_host_scores_good() {
        let assessment = score_findings(&findings(&[
            (AuditCategory::Packages, SECURITY_UPDATES, 0),
            (AuditCategory::Permissions, WORLD_WRITABLE_FILES, 0),
            (AuditCategory::Network, INSECURE_SERVICES, 0),
        ]));
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.level, SecurityLevel::Good);
        assert!(assessment.recommendations.is_empty());
    }

    #[test]
    fn test_caps_apply() {
        let assessment = score_findings(&findings(&[
            (AuditCategory::Packages, SECURITY_UPDATES, 50),
            (AuditCategory::Permissions, WORLD_WRITABLE_FILES, 50),
        ]));
        assert_eq!(assessment.score, 100 - 30 - 20);
        assert_eq!(assessment.level, SecurityLevel::Warning);
        assert_eq!(
            assessment.recommendations,
            vec![
                "Apply 50 security updates immediately".to_string(),
                "Fix 50 world-writable files".to_string()
            ]
        );
    }

    #[test]
    fn test_insecure_services_uncapped_and_clamped() {
        let assessment = score_findings(&findings(&[(
            AuditCategory::Network,
            INSECURE_SERVICES,
            8,
        )]));
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.level, SecurityLevel::Critical);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let input = findings(&[
            (AuditCategory::Packages, SECURITY_UPDATES, 3),
            (AuditCategory::Network, INSECURE_SERVICES, 1),
        ]);
        assert_eq!(score_findings(&input), score_findings(&input));
        assert_eq!(score_findings(&input).score, 100 - 15 - 15);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Packages".parse::<AuditCategory>().unwrap(), AuditCategory::Packages);
        assert!("kernel".parse::<AuditCategory>().is_err());
    }
}

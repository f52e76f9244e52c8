//! Remote log fetching and hunting
//!
//! `fetch_logs` tails whole files and runs pattern analysis on them.
//! `hunt` greps many logs for many patterns, turns each hit into a
//! [`LogMatch`] and correlates the hits in time.

use crate::correlation::{CorrelationReport, EventCorrelator, LogMatch, DEFAULT_MAX_CLUSTERS};
use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{run_shell, CommandResult, RemoteExecutor};
use crate::log_patterns::{LogAnalysis, LogPatternAnalyzer, MAX_ANALYZED_LINES};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Logs searched when the caller names none
pub const DEFAULT_HUNT_LOGS: &[&str] = &[
    "/var/log/syslog",
    "/var/log/messages",
    "/var/log/auth.log",
    "/var/log/secure",
    "/var/log/kern.log",
];

/// Lines returned per (log, pattern) grep
const HUNT_TAIL_LINES: usize = 100;

/// `Nh` or `Nd` look-back for journal searches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Hours(u32),
    Days(u32),
}

impl TimeRange {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || {
            MedicError::InvalidArgument(format!(
                "time range '{}' must look like 6h or 2d",
                raw
            ))
        };
        let amount = |digits: &str| digits.parse::<u32>().map_err(|_| invalid());
        if let Some(digits) = raw.strip_suffix('h') {
            Ok(TimeRange::Hours(amount(digits)?))
        } else if let Some(digits) = raw.strip_suffix('d') {
            Ok(TimeRange::Days(amount(digits)?))
        } else {
            Err(invalid())
        }
    }

    /// `--since` argument for journalctl
    pub fn since_filter(&self) -> String {
        match self {
            TimeRange::Hours(n) => format!("--since '{} hours ago'", n),
            TimeRange::Days(n) => format!("--since '{} days ago'", n),
        }
    }
}

/// Probe command for one (log, pattern) pair
pub fn hunt_command(log_path: &str, pattern: &str, time_range: Option<TimeRange>) -> String {
    let quoted = shell_words::quote(pattern);
    match time_range {
        Some(range) if log_path.contains("journal") => {
            format!("journalctl {} | grep -E {}", range.since_filter(), quoted)
        }
        _ => format!(
            "grep -E {} {} 2>/dev/null | tail -{}",
            quoted,
            shell_words::quote(log_path),
            HUNT_TAIL_LINES
        ),
    }
}

/// Probe command for tailing one log
pub fn fetch_command(log_path: &str, lines: usize, filter: Option<&str>) -> String {
    let mut command = format!("tail -n {} {}", lines, shell_words::quote(log_path));
    if let Some(filter) = filter {
        command.push_str(&format!(" | grep -E {}", shell_words::quote(filter)));
    }
    command
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchedLog {
    #[serde(flatten)]
    pub result: CommandResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<LogAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub total_logs: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    /// True only when every log was fetched
    pub ok: bool,
    pub logs: BTreeMap<String, FetchedLog>,
    pub summary: FetchSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternHits {
    pub matches: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HuntSummary {
    pub patterns_searched: usize,
    pub logs_searched: usize,
    pub logs_with_matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HuntReport {
    pub ok: bool,
    /// log path -> pattern -> hits, only for logs with hits
    pub hunt_results: BTreeMap<String, BTreeMap<String, PatternHits>>,
    pub correlation: CorrelationReport,
    pub summary: HuntSummary,
}

pub struct LogHunter<'a> {
    executor: &'a dyn RemoteExecutor,
    analyzer: LogPatternAnalyzer,
    max_correlations: usize,
}

impl<'a> LogHunter<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self {
            executor,
            analyzer: LogPatternAnalyzer::new(),
            max_correlations: DEFAULT_MAX_CLUSTERS,
        }
    }

    pub fn with_max_correlations(mut self, max_correlations: usize) -> Self {
        self.max_correlations = max_correlations;
        self
    }

    /// Tail each log, optionally filtered, and analyse what came back
    pub async fn fetch_logs(
        &self,
        host_pattern: &str,
        log_paths: &[String],
        lines: usize,
        filter: Option<&str>,
        analyze: bool,
    ) -> Result<FetchReport> {
        require_host_pattern(host_pattern)?;
        if log_paths.is_empty() {
            return Err(MedicError::InvalidArgument(
                "at least one log path is required".to_string(),
            ));
        }

        let mut logs = BTreeMap::new();
        for path in log_paths {
            let command = fetch_command(path, lines, filter);
            let result = run_shell(self.executor, host_pattern, &command).await;
            let analysis = (result.ok && analyze)
                .then(|| self.analyzer.analyze(&result.payload_lines().join("\n")));
            logs.insert(path.clone(), FetchedLog { result, analysis });
        }

        let successful = logs.values().filter(|l| l.result.ok).count();
        let failed = logs.len() - successful;
        info!(
            "[LOGS] fetched {}/{} logs from {}",
            successful,
            logs.len(),
            host_pattern
        );

        Ok(FetchReport {
            ok: failed == 0,
            summary: FetchSummary {
                total_logs: logs.len(),
                successful,
                failed,
            },
            logs,
        })
    }

    /// Search logs for patterns and correlate hits within `window_secs`
    pub async fn hunt(
        &self,
        host_pattern: &str,
        patterns: &[String],
        log_paths: &[String],
        time_range: Option<&str>,
        window_secs: u64,
    ) -> Result<HuntReport> {
        require_host_pattern(host_pattern)?;
        if patterns.is_empty() {
            return Err(MedicError::InvalidArgument(
                "at least one search pattern is required".to_string(),
            ));
        }
        let time_range = time_range.map(TimeRange::parse).transpose()?;

        let logs: Vec<String> = if log_paths.is_empty() {
            DEFAULT_HUNT_LOGS.iter().map(|p| p.to_string()).collect()
        } else {
            log_paths.to_vec()
        };
        info!(
            "[HUNT] {} patterns across {} logs on {}",
            patterns.len(),
            logs.len(),
            host_pattern
        );

        let mut hunt_results = BTreeMap::new();
        let mut all_matches = Vec::new();
        for log_path in &logs {
            let mut per_pattern = BTreeMap::new();
            for pattern in patterns {
                let command = hunt_command(log_path, pattern, time_range);
                let result = run_shell(self.executor, host_pattern, &command).await;
                if !result.ok {
                    // grep exits 1 on no match
                    continue;
                }
                let lines = result.payload_lines();
                let start = lines.len().saturating_sub(MAX_ANALYZED_LINES);
                let hits: Vec<String> = lines[start..].iter().map(|l| l.to_string()).collect();
                if hits.is_empty() {
                    continue;
                }
                debug!("[HUNT] {} hits for '{}' in {}", hits.len(), pattern, log_path);
                all_matches.extend(hits.iter().map(|line| LogMatch::new(log_path, pattern, line)));
                per_pattern.insert(
                    pattern.clone(),
                    PatternHits {
                        count: hits.len(),
                        matches: hits,
                    },
                );
            }
            if !per_pattern.is_empty() {
                hunt_results.insert(log_path.clone(), per_pattern);
            }
        }

        let correlation = EventCorrelator::new(window_secs)
            .with_max_clusters(self.max_correlations)
            .correlate(&all_matches);

        Ok(HuntReport {
            ok: true,
            summary: HuntSummary {
                patterns_searched: patterns.len(),
                logs_searched: logs.len(),
                logs_with_matches: hunt_results.len(),
            },
            hunt_results,
            correlation,
        })
    }
}

//! Time-windowed event correlation
//!
//! Log matches carrying a recognisable timestamp are sorted ascending; each
//! one becomes a candidate primary and collects every later match within the
//! window. Clusters are not deduplicated: an event claimed by one primary can
//! still be the primary of the next cluster.

use crate::error::{MedicError, Result};
use crate::log_patterns::{LogCategory, MAX_ANALYZED_LINES};
use chrono::{Datelike, Local, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Clusters reported when no cap is configured
pub const DEFAULT_MAX_CLUSTERS: usize = 10;

static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})").expect("valid ISO timestamp regex")
});

static SYSLOG_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z]{3}\s+\d{1,2} \d{2}:\d{2}:\d{2})")
        .expect("valid syslog timestamp regex")
});

/// Parse the first recognised timestamp in a line, assuming the current year
/// for syslog-style stamps
pub fn extract_timestamp(line: &str) -> Option<NaiveDateTime> {
    extract_timestamp_in_year(line, Local::now().year())
}

/// Same as [`extract_timestamp`] with an explicit year for syslog stamps
pub fn extract_timestamp_in_year(line: &str, year: i32) -> Option<NaiveDateTime> {
    if let Some(caps) = ISO_TIMESTAMP.captures(line) {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d %H:%M:%S") {
            return Some(ts);
        }
    }
    let caps = SYSLOG_TIMESTAMP.captures(line)?;
    let stamp = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&format!("{} {}", year, stamp), "%Y %b %d %H:%M:%S").ok()
}

/// One line matched by one search pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMatch {
    pub source_log: String,
    pub pattern: String,
    pub line: String,
    /// First incident category matching the line
    pub category: Option<LogCategory>,
    pub timestamp: Option<NaiveDateTime>,
}

impl LogMatch {
    pub fn new(source_log: &str, pattern: &str, line: &str) -> Self {
        Self {
            source_log: source_log.to_string(),
            pattern: pattern.to_string(),
            line: line.to_string(),
            category: LogCategory::classify(line),
            timestamp: extract_timestamp(line),
        }
    }
}

/// Matches of `pattern` within the last lines of `text`, in line order
pub fn scan_matches(source_log: &str, pattern: &str, text: &str) -> Result<Vec<LogMatch>> {
    let re = Regex::new(pattern)
        .map_err(|e| MedicError::InvalidArgument(format!("bad pattern '{}': {}", pattern, e)))?;

    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(MAX_ANALYZED_LINES);
    Ok(lines[start..]
        .iter()
        .filter(|line| re.is_match(line))
        .map(|line| LogMatch::new(source_log, pattern, line))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatedCluster {
    pub primary: LogMatch,
    pub related: Vec<LogMatch>,
    /// `1 + related.len()`
    pub strength: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub total_matches: usize,
    /// Matches that carried a parseable timestamp
    pub timestamped_matches: usize,
    /// Clusters found before capping
    pub correlated_events: usize,
    /// First clusters in ascending primary-timestamp order
    pub correlations: Vec<CorrelatedCluster>,
}

/// Groups log matches that occur close together in time
#[derive(Debug, Clone, Copy)]
pub struct EventCorrelator {
    window_secs: i64,
    max_clusters: usize,
}

impl EventCorrelator {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX),
            max_clusters: DEFAULT_MAX_CLUSTERS,
        }
    }

    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    pub fn correlate(&self, matches: &[LogMatch]) -> CorrelationReport {
        let mut timed: Vec<(NaiveDateTime, &LogMatch)> = matches
            .iter()
            .filter_map(|m| m.timestamp.map(|ts| (ts, m)))
            .collect();
        timed.sort_by_key(|(ts, _)| *ts);

        let mut clusters = Vec::new();
        for (i, (primary_ts, primary)) in timed.iter().enumerate() {
            let related: Vec<LogMatch> = timed[i + 1..]
                .iter()
                .take_while(|(ts, _)| (*ts - *primary_ts).num_seconds() <= self.window_secs)
                .map(|(_, m)| (*m).clone())
                .collect();
            if related.is_empty() {
                continue;
            }
            clusters.push(CorrelatedCluster {
                primary: (*primary).clone(),
                strength: 1 + related.len(),
                related,
            });
        }

        let correlated_events = clusters.len();
        clusters.truncate(self.max_clusters);
        CorrelationReport {
            total_matches: matches.len(),
            timestamped_matches: timed.len(),
            correlated_events,
            correlations: clusters,
        }
    }
}

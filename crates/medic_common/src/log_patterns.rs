//! Log pattern analysis
//!
//! Classifies raw log text into incident categories over the last
//! [`MAX_ANALYZED_LINES`] lines and keeps a sliding window of the most recent
//! error-like lines.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::LazyLock;

/// Only the tail of a blob is ever inspected
pub const MAX_ANALYZED_LINES: usize = 1000;

/// Size of the recent-errors window
pub const RECENT_ERRORS_CAP: usize = 10;

/// Incident category, in matching order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Error,
    Warning,
    Failure,
    Timeout,
    Connection,
    Memory,
    Permission,
}

impl LogCategory {
    pub const ALL: [LogCategory; 7] = [
        LogCategory::Error,
        LogCategory::Warning,
        LogCategory::Failure,
        LogCategory::Timeout,
        LogCategory::Connection,
        LogCategory::Memory,
        LogCategory::Permission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Error => "error",
            LogCategory::Warning => "warning",
            LogCategory::Failure => "failure",
            LogCategory::Timeout => "timeout",
            LogCategory::Connection => "connection",
            LogCategory::Memory => "memory",
            LogCategory::Permission => "permission",
        }
    }

    /// Regex source for this category
    pub fn pattern(&self) -> &'static str {
        match self {
            LogCategory::Error => "ERROR|CRITICAL|FATAL",
            LogCategory::Warning => "WARNING|WARN",
            LogCategory::Failure => "failed|failure|exception",
            LogCategory::Timeout => "timeout|timed out",
            LogCategory::Connection => "connection refused|connection reset",
            LogCategory::Memory => "out of memory|oom",
            LogCategory::Permission => "permission denied|access denied",
        }
    }

    /// Categories whose lines feed the recent-errors window
    pub fn is_error_like(&self) -> bool {
        matches!(
            self,
            LogCategory::Error | LogCategory::Failure | LogCategory::Timeout
        )
    }

    /// First category whose pattern matches `line`
    pub fn classify(line: &str) -> Option<LogCategory> {
        let lowered = line.to_lowercase();
        CATEGORY_RULES
            .iter()
            .find(|(_, re)| re.is_match(&lowered))
            .map(|(category, _)| *category)
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static CATEGORY_RULES: LazyLock<Vec<(LogCategory, Regex)>> = LazyLock::new(|| {
    LogCategory::ALL
        .iter()
        .map(|category| {
            let re = RegexBuilder::new(category.pattern())
                .case_insensitive(true)
                .build()
                .expect("category patterns are valid regexes");
            (*category, re)
        })
        .collect()
});

/// Result of analysing one log blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysis {
    /// Every category is present, zero when unmatched
    pub category_counts: BTreeMap<LogCategory, usize>,
    /// Most recent last
    pub recent_errors: Vec<String>,
    pub total_lines_analyzed: usize,
    /// Sum of matches over lines considered; may exceed 100
    pub error_rate_percent: f64,
}

impl LogAnalysis {
    pub fn count(&self, category: LogCategory) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total_matches(&self) -> usize {
        self.category_counts.values().sum()
    }
}

/// Stateless classifier over log text
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPatternAnalyzer;

impl LogPatternAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, log_text: &str) -> LogAnalysis {
        let lines: Vec<&str> = log_text.lines().collect();
        let start = lines.len().saturating_sub(MAX_ANALYZED_LINES);
        let window = &lines[start..];

        let mut category_counts: BTreeMap<LogCategory, usize> =
            LogCategory::ALL.iter().map(|c| (*c, 0)).collect();
        let mut recent: VecDeque<String> = VecDeque::with_capacity(RECENT_ERRORS_CAP + 1);

        for line in window {
            let lowered = line.to_lowercase();
            for (category, re) in CATEGORY_RULES.iter() {
                if !re.is_match(&lowered) {
                    continue;
                }
                *category_counts.entry(*category).or_insert(0) += 1;
                if category.is_error_like() {
                    recent.push_back(line.trim().to_string());
                    if recent.len() > RECENT_ERRORS_CAP {
                        recent.pop_front();
                    }
                }
            }
        }

        let total_matches: usize = category_counts.values().sum();
        let considered = window.len();
        LogAnalysis {
            category_counts,
            recent_errors: recent.into_iter().collect(),
            total_lines_analyzed: considered,
            error_rate_percent: total_matches as f64 / considered.max(1) as f64 * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let analysis = LogPatternAnalyzer::new().analyze("");
        assert_eq!(analysis.total_lines_analyzed, 0);
        assert_eq!(analysis.error_rate_percent, 0.0);
        assert_eq!(analysis.category_counts.len(), 7);
        assert!(analysis.category_counts.values().all(|c| *c == 0));
        assert!(analysis.recent_errors.is_empty());
    }

    #[test]
    fn test_uppercase_keywords_match() {
        let analysis = LogPatternAnalyzer::new().analyze("kernel: ERROR something\nWARN low disk\n");
        assert_eq!(analysis.count(LogCategory::Error), 1);
        assert_eq!(analysis.count(LogCategory::Warning), 1);
        assert_eq!(analysis.recent_errors, vec!["kernel: ERROR something"]);
    }

    #[test]
    fn test_multi_category_line_counts_each() {
        let text = "ERROR: connection refused, request timed out\n";
        let analysis = LogPatternAnalyzer::new().analyze(text);
        assert_eq!(analysis.count(LogCategory::Error), 1);
        assert_eq!(analysis.count(LogCategory::Timeout), 1);
        assert_eq!(analysis.count(LogCategory::Connection), 1);
        // error + timeout both push the same line
        assert_eq!(analysis.recent_errors.len(), 2);
        assert_eq!(analysis.error_rate_percent, 300.0);
    }

    #[test]
    fn test_recent_errors_is_sliding_window() {
        let text: String = (0..25).map(|i| format!("job {} failed\n", i)).collect();
        let analysis = LogPatternAnalyzer::new().analyze(&text);
        assert_eq!(analysis.recent_errors.len(), RECENT_ERRORS_CAP);
        assert_eq!(analysis.recent_errors.first().unwrap(), "job 15 failed");
        assert_eq!(analysis.recent_errors.last().unwrap(), "job 24 failed");
    }

    #[test]
    fn test_only_tail_is_analyzed() {
        let mut text = String::new();
        for _ in 0..500 {
            text.push_str("FATAL early\n");
        }
        for _ in 0..1000 {
            text.push_str("all good\n");
        }
        let analysis = LogPatternAnalyzer::new().analyze(&text);
        assert_eq!(analysis.total_lines_analyzed, 1000);
        assert_eq!(analysis.count(LogCategory::Error), 0);
    }

    #[test]
    fn test_classify_first_match() {
        assert_eq!(
            LogCategory::classify("Permission denied while writing"),
            Some(LogCategory::Permission)
        );
        assert_eq!(
            LogCategory::classify("ERROR: out of memory"),
            Some(LogCategory::Error)
        );
        assert_eq!(LogCategory::classify("nothing to see"), None);
    }

    #[test]
    fn test_counts_serialize_by_name() {
        let analysis = LogPatternAnalyzer::new().analyze("oom-killer invoked\n");
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["category_counts"]["memory"], 1);
        assert_eq!(json["category_counts"]["error"], 0);
    }
}

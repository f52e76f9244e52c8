//! Health scoring
//!
//! [`HealthScorer::score`] is a pure function of a [`MetricsBag`]. Only the keys
//! in [`SCORED_METRICS`] are read; anything else in the bag is carried along
//! untouched, and a missing scored key takes its default from that table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CPU_PERCENT: &str = "cpu_percent";
pub const MEMORY_PERCENT: &str = "memory_percent";
pub const DISK_USAGE_PERCENT: &str = "disk_usage_percent";
pub const FAILED_SERVICES: &str = "failed_services";
pub const NETWORK_REACHABLE: &str = "network_reachable";

/// Value used for a scored key that is absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricDefault {
    Number(f64),
    Flag(bool),
    EmptyList,
}

/// Keys the scorer reads, with their defaults
pub const SCORED_METRICS: &[(&str, MetricDefault)] = &[
    (CPU_PERCENT, MetricDefault::Number(0.0)),
    (MEMORY_PERCENT, MetricDefault::Number(0.0)),
    (DISK_USAGE_PERCENT, MetricDefault::Number(0.0)),
    (FAILED_SERVICES, MetricDefault::EmptyList),
    (NETWORK_REACHABLE, MetricDefault::Flag(true)),
];

fn default_for(key: &str) -> Option<MetricDefault> {
    SCORED_METRICS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, default)| *default)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
    List(Vec<String>),
    Text(String),
}

/// Ordered metric name -> value map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsBag(BTreeMap<String, MetricValue>);

impl MetricsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetricValue) {
        self.0.insert(key.into(), value);
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.insert(key, MetricValue::Number(value));
        self
    }

    pub fn with_flag(mut self, key: &str, value: bool) -> Self {
        self.insert(key, MetricValue::Flag(value));
        self
    }

    pub fn with_list(mut self, key: &str, values: &[&str]) -> Self {
        self.insert(
            key,
            MetricValue::List(values.iter().map(|v| v.to_string()).collect()),
        );
        self
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.insert(key, MetricValue::Text(value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.0.iter()
    }

    /// Copy every entry of `other` into this bag; later values win
    pub fn merge(&mut self, other: &MetricsBag) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Numeric value of a scored key, or its table default
    pub fn number(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(MetricValue::Number(n)) => *n,
            _ => match default_for(key) {
                Some(MetricDefault::Number(n)) => n,
                _ => 0.0,
            },
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(MetricValue::Flag(b)) => *b,
            _ => match default_for(key) {
                Some(MetricDefault::Flag(b)) => b,
                _ => false,
            },
        }
    }

    pub fn list(&self, key: &str) -> &[String] {
        match self.0.get(key) {
            Some(MetricValue::List(items)) => items,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

impl HealthLevel {
    pub fn from_score(score: u8) -> Self {
        if score < 50 {
            HealthLevel::Critical
        } else if score < 80 {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Warning => "warning",
            HealthLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub score: u8,
    pub level: HealthLevel,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Weighted-deduction health model
#[derive(Debug, Default, Clone, Copy)]
pub struct HealthScorer;

impl HealthScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, metrics: &MetricsBag) -> HealthAssessment {
        let mut score: i32 = 100;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut deduct = |points: i32, issue: String, rec: String| {
            score -= points;
            issues.push(issue);
            recommendations.push(rec);
        };

        let cpu = metrics.number(CPU_PERCENT);
        if cpu > 90.0 {
            deduct(
                30,
                "Critical CPU usage".into(),
                "Identify high CPU processes and optimize or scale".into(),
            );
        } else if cpu > 75.0 {
            deduct(
                15,
                "High CPU usage".into(),
                "Monitor CPU trends and prepare for scaling".into(),
            );
        }

        let memory = metrics.number(MEMORY_PERCENT);
        if memory > 95.0 {
            deduct(
                25,
                "Critical memory usage".into(),
                "Free memory or add more RAM".into(),
            );
        } else if memory > 85.0 {
            deduct(
                10,
                "High memory usage".into(),
                "Monitor memory consumption patterns".into(),
            );
        }

        let disk = metrics.number(DISK_USAGE_PERCENT);
        if disk > 95.0 {
            deduct(
                20,
                "Critical disk space".into(),
                "Clean up files or expand storage".into(),
            );
        } else if disk > 85.0 {
            deduct(
                10,
                "High disk usage".into(),
                "Plan for disk space expansion".into(),
            );
        }

        for service in metrics.list(FAILED_SERVICES) {
            deduct(
                15,
                format!("Service {} is failed", service),
                format!("Investigate and restart {}", service),
            );
        }

        if !metrics.flag(NETWORK_REACHABLE) {
            deduct(
                20,
                "Network connectivity issues".into(),
                "Check network configuration and connectivity".into(),
            );
        }

        let score = score.clamp(0, 100) as u8;
        HealthAssessment {
            score,
            level: HealthLevel::from_score(score),
            issues,
            recommendations,
        }
    }
}

//! Performance micro-benchmarks
//!
//! Each benchmark is one shell probe whose output is kept as an opaque string.
//! Scoring only reads the leading number of the load and memory readings.

use crate::baseline::generate_snapshot_id;
use crate::error::{require_host_pattern, Result};
use crate::executor::{run_shell, RemoteExecutor};
use serde::{Deserialize, Serialize};
use tracing::info;

const CPU_BENCH: &str = "time (for i in {1..1000000}; do echo $((i*i)) > /dev/null; done) 2>&1 | grep real | awk '{print $2}'";
const MEMORY_BENCH: &str =
    "dd if=/dev/zero of=/tmp/testfile bs=1M count=100 2>&1 | grep -o '[0-9.]* MB/s' | head -1";
const DISK_BENCH: &str = "dd if=/dev/zero of=/tmp/testfile bs=1M count=100 conv=fdatasync 2>&1 | grep -o '[0-9.]* MB/s' | tail -1; rm -f /tmp/testfile";
const NETWORK_BENCH: &str = "ping -c 10 $(ip route | grep default | awk '{print $3}' | head -1) | grep 'avg' | awk -F'/' '{print $5}'";
const LOAD_PROBE: &str = "uptime | awk '{print $(NF-2)}' | tr -d ','";

/// Default benchmark duration reported back to the caller
pub const DEFAULT_BENCHMARK_SECS: u64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Benchmarks {
    pub cpu: String,
    pub memory: String,
    pub disk_write: String,
    pub network_latency: String,
    pub system_load: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Poor,
}

impl PerformanceLevel {
    pub fn from_score(score: u8) -> Self {
        if score > 85 {
            PerformanceLevel::Excellent
        } else if score > 70 {
            PerformanceLevel::Good
        } else {
            PerformanceLevel::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceAssessment {
    pub score: u8,
    pub level: PerformanceLevel,
    pub issues: Vec<String>,
}

fn leading_number(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Score benchmark readings
pub fn assess_benchmarks(benchmarks: &Benchmarks) -> PerformanceAssessment {
    let mut score: i32 = 100;
    let mut issues = Vec::new();
    let mut unparsed = false;

    if !benchmarks.system_load.is_empty() {
        match leading_number(&benchmarks.system_load) {
            Some(load) if load > 2.0 => {
                score -= 20;
                issues.push("High system load detected".to_string());
            }
            Some(_) => {}
            None => unparsed = true,
        }
    }

    if benchmarks.memory.contains("MB/s") {
        match leading_number(&benchmarks.memory) {
            Some(speed) if speed < 100.0 => {
                score -= 15;
                issues.push("Low memory bandwidth".to_string());
            }
            Some(_) => {}
            None => unparsed = true,
        }
    }

    if unparsed {
        issues.push("Could not parse some benchmark results".to_string());
    }

    let score = score.clamp(0, 100) as u8;
    PerformanceAssessment {
        score,
        level: PerformanceLevel::from_score(score),
        issues,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceBaseline {
    pub timestamp: String,
    pub benchmarks: Benchmarks,
    pub performance_assessment: PerformanceAssessment,
    /// Returned to the caller only, never stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub ok: bool,
    pub baseline: PerformanceBaseline,
    pub host_pattern: String,
    pub duration: u64,
}

pub struct PerformanceBenchmark<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> PerformanceBenchmark<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    pub async fn run(
        &self,
        host_pattern: &str,
        duration_secs: u64,
        store_baseline: bool,
    ) -> Result<PerformanceReport> {
        require_host_pattern(host_pattern)?;
        info!("[BENCH] running benchmarks on {}", host_pattern);

        let benchmarks = Benchmarks {
            cpu: self.reading(host_pattern, CPU_BENCH).await,
            memory: self.reading(host_pattern, MEMORY_BENCH).await,
            disk_write: self.reading(host_pattern, DISK_BENCH).await,
            network_latency: self.reading(host_pattern, NETWORK_BENCH).await,
            system_load: self.reading(host_pattern, LOAD_PROBE).await,
        };
        let performance_assessment = assess_benchmarks(&benchmarks);
        info!(
            "[BENCH] {} scored {} ({:?})",
            host_pattern, performance_assessment.score, performance_assessment.level
        );

        Ok(PerformanceReport {
            ok: true,
            baseline: PerformanceBaseline {
                timestamp: crate::timestamp_now(),
                benchmarks,
                performance_assessment,
                baseline_id: store_baseline.then(generate_snapshot_id),
            },
            host_pattern: host_pattern.to_string(),
            duration: duration_secs,
        })
    }

    async fn reading(&self, host_pattern: &str, command: &str) -> String {
        run_shell(self.executor, host_pattern, command)
            .await
            .payload_lines()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FakeExecutorBuilder, FakeResponse};

    #[test]
    fn test_assessment_thresholds() {
        let slow = Benchmarks {
            memory: "85.3 MB/s".to_string(),
            system_load: "2.75".to_string(),
            ..Default::default()
        };
        let assessment = assess_benchmarks(&slow);
        assert_eq!(assessment.score, 65);
        assert_eq!(assessment.level, PerformanceLevel::Poor);
        assert_eq!(
            assessment.issues,
            vec!["High system load detected", "Low memory bandwidth"]
        );
    }

    #[test]
    fn test_unparsed_reading_is_noted() {
        let odd = Benchmarks {
            system_load: "load:".to_string(),
            memory: "1.2 GB/s".to_string(),
            ..Default::default()
        };
        let assessment = assess_benchmarks(&odd);
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.level, PerformanceLevel::Excellent);
        assert_eq!(
            assessment.issues,
            vec!["Could not parse some benchmark results"]
        );
    }

    #[test]
    fn test_levels() {
        assert_eq!(PerformanceLevel::from_score(86), PerformanceLevel::Excellent);
        assert_eq!(PerformanceLevel::from_score(85), PerformanceLevel::Good);
        assert_eq!(PerformanceLevel::from_score(70), PerformanceLevel::Poor);
    }

    #[tokio::test]
    async fn test_run_collects_five_readings() {
        let fake = FakeExecutorBuilder::new()
            .default_response(FakeResponse::ok(""))
            .respond("conv=fdatasync", FakeResponse::ok("310 MB/s\n"))
            .respond("count=100", FakeResponse::ok("1.5 GB/s\n"))
            .respond("uptime", FakeResponse::ok("0.42\n"))
            .build();
        let report = PerformanceBenchmark::new(&fake)
            .run("db", DEFAULT_BENCHMARK_SECS, true)
            .await
            .unwrap();

        assert_eq!(fake.total_calls(), 5);
        assert_eq!(report.baseline.benchmarks.disk_write, "310 MB/s");
        assert_eq!(report.baseline.benchmarks.memory, "1.5 GB/s");
        assert_eq!(report.baseline.performance_assessment.score, 100);
        assert!(report.baseline.baseline_id.unwrap().starts_with("snapshot_"));
    }
}

//! Health monitoring over time
//!
//! Samples load, memory and disk at a fixed interval driven by a tokio ticker.
//! The call lasts for the whole monitoring duration; dropping the future stops
//! sampling at the next tick.

use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{run_shell, RemoteExecutor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

const SAMPLE_PROBE: &str = "echo $(date '+%Y-%m-%d %H:%M:%S'),$(cat /proc/loadavg | awk '{print $1}'),$(free | grep Mem | awk '{print ($3/$2)*100}'),$(df / | tail -1 | awk '{print $5}' | sed 's/%//')";

/// Trend dead bands
const LOAD_TREND_BAND: f64 = 0.1;
const MEMORY_TREND_BAND: f64 = 1.0;

/// Spike thresholds relative to the series mean
const LOAD_SPIKE_FACTOR: f64 = 1.5;
const MEMORY_SPIKE_FACTOR: f64 = 1.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSample {
    pub timestamp: String,
    pub load_average: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl MonitoringSample {
    /// Parse `timestamp,load,memory,disk`
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() != 4 {
            return None;
        }
        Some(Self {
            timestamp: fields[0].trim().to_string(),
            load_average: fields[1].trim().parse().ok()?,
            memory_percent: fields[2].trim().parse().ok()?,
            disk_percent: fields[3].trim().parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    fn classify(slope: f64, band: f64) -> Self {
        if slope > band {
            TrendDirection::Increasing
        } else if slope < -band {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrendAnalysis {
    Trend {
        load_trend: TrendDirection,
        memory_trend: TrendDirection,
        anomalies: Vec<String>,
        average_load: f64,
        average_memory: f64,
    },
    Insufficient {
        error: String,
    },
}

/// Trend and spike analysis over a sample series
pub fn analyze_trend(samples: &[MonitoringSample]) -> TrendAnalysis {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() > 1 => (first, last),
        _ => {
            return TrendAnalysis::Insufficient {
                error: "Insufficient data for trend analysis".to_string(),
            }
        }
    };

    let n = samples.len() as f64;
    let load_slope = (last.load_average - first.load_average) / n;
    let memory_slope = (last.memory_percent - first.memory_percent) / n;

    let average_load = samples.iter().map(|s| s.load_average).sum::<f64>() / n;
    let average_memory = samples.iter().map(|s| s.memory_percent).sum::<f64>() / n;

    let mut anomalies = Vec::new();
    for sample in samples {
        if sample.load_average > average_load * LOAD_SPIKE_FACTOR {
            anomalies.push(format!(
                "High load spike at {}: {}",
                sample.timestamp, sample.load_average
            ));
        }
        if sample.memory_percent > average_memory * MEMORY_SPIKE_FACTOR {
            anomalies.push(format!(
                "Memory spike at {}: {}%",
                sample.timestamp, sample.memory_percent
            ));
        }
    }

    TrendAnalysis::Trend {
        load_trend: TrendDirection::classify(load_slope, LOAD_TREND_BAND),
        memory_trend: TrendDirection::classify(memory_slope, MEMORY_TREND_BAND),
        anomalies,
        average_load,
        average_memory,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Monitoring {
    pub start_time: String,
    pub duration_seconds: u64,
    pub interval_seconds: u64,
    pub data_points: usize,
    pub metrics_history: Vec<MonitoringSample>,
    pub trend_analysis: TrendAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub ok: bool,
    pub monitoring: Monitoring,
    pub host_pattern: String,
}

pub struct HealthMonitor<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> HealthMonitor<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Take `duration_secs / interval_secs` samples, one per tick
    pub async fn monitor(
        &self,
        host_pattern: &str,
        duration_secs: u64,
        interval_secs: u64,
    ) -> Result<MonitorReport> {
        require_host_pattern(host_pattern)?;
        if interval_secs == 0 {
            return Err(MedicError::InvalidArgument(
                "monitor interval must be at least one second".to_string(),
            ));
        }

        let points = duration_secs / interval_secs;
        let start_time = crate::timestamp_now();
        info!(
            "[MONITOR] {} samples every {}s on {}",
            points, interval_secs, host_pattern
        );

        let mut ticker = interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut history = Vec::new();
        for i in 0..points {
            // First tick completes immediately
            ticker.tick().await;
            let result = run_shell(self.executor, host_pattern, SAMPLE_PROBE).await;
            if !result.ok {
                continue;
            }
            match result
                .payload_lines()
                .last()
                .and_then(|line| MonitoringSample::parse(line))
            {
                Some(sample) => history.push(sample),
                None => debug!("[MONITOR] dropped unparseable sample {}", i),
            }
        }

        let trend_analysis = analyze_trend(&history);
        Ok(MonitorReport {
            ok: true,
            monitoring: Monitoring {
                start_time,
                duration_seconds: duration_secs,
                interval_seconds: interval_secs,
                data_points: history.len(),
                metrics_history: history,
                trend_analysis,
            },
            host_pattern: host_pattern.to_string(),
        })
    }
}

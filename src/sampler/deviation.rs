//! Resource deviation tracking.
//!
//! Every sampling pass checks each process against warning and critical
//! thresholds. The most recent offender overwrites the shared record; nothing
//! ever clears it.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProcessFact;

/// Severity of a recorded deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// Which metric tripped the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationMetric {
    Cpu,
    Memory,
}

/// The latest process seen above a resource threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationRecord {
    pub process_name: String,
    pub metric: DeviationMetric,
    pub value: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Per-process thresholds. CPU in percent, memory in MB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviationThresholds {
    pub warning_cpu_percent: f64,
    pub critical_cpu_percent: f64,
    pub warning_memory_mb: f64,
    pub critical_memory_mb: f64,
}

impl Default for DeviationThresholds {
    fn default() -> Self {
        Self {
            warning_cpu_percent: 70.0,
            critical_cpu_percent: 90.0,
            warning_memory_mb: 500.0,
            critical_memory_mb: 800.0,
        }
    }
}

impl DeviationThresholds {
    /// Classify one process observation, or `None` if it is within bounds.
    pub fn evaluate(&self, fact: &ProcessFact) -> Option<(DeviationMetric, f64, Severity)> {
        let cpu = fact.cpu_percent;
        let memory = fact.memory_mb();

        if cpu > self.critical_cpu_percent {
            return Some((DeviationMetric::Cpu, cpu, Severity::Critical));
        }
        if memory > self.critical_memory_mb {
            return Some((DeviationMetric::Memory, memory, Severity::Critical));
        }
        if cpu > self.warning_cpu_percent {
            return Some((DeviationMetric::Cpu, cpu, Severity::Warning));
        }
        if memory > self.warning_memory_mb {
            return Some((DeviationMetric::Memory, memory, Severity::Warning));
        }
        None
    }
}

/// Shared last-deviation slot, written by sampling passes and read by the
/// self-monitor endpoint. Concurrent passes race benignly: last write wins.
#[derive(Debug, Default)]
pub struct DeviationTracker {
    thresholds: DeviationThresholds,
    last: RwLock<Option<DeviationRecord>>,
}

impl DeviationTracker {
    pub fn new(thresholds: DeviationThresholds) -> Self {
        Self {
            thresholds,
            last: RwLock::new(None),
        }
    }

    /// Check `fact` and overwrite the record if it deviates.
    pub fn observe(&self, fact: &ProcessFact) -> Option<Severity> {
        let (metric, value, severity) = self.thresholds.evaluate(fact)?;
        debug!(process = %fact.name, pid = fact.pid, ?metric, value, ?severity, "resource deviation");

        let record = DeviationRecord {
            process_name: fact.name.clone(),
            metric,
            value,
            severity,
            timestamp: Utc::now(),
        };
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some(record);
        Some(severity)
    }

    pub fn last(&self) -> Option<DeviationRecord> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn fact(name: &str, cpu: f64, memory_mb: u64) -> ProcessFact {
        ProcessFact {
            pid: 42,
            name: name.to_string(),
            cpu_percent: cpu,
            memory_bytes: memory_mb * MB,
        }
    }

    #[test]
    fn test_within_bounds_records_nothing() {
        let tracker = DeviationTracker::default();
        assert_eq!(tracker.observe(&fact("calm", 70.0, 500)), None);
        assert!(tracker.last().is_none());
    }

    #[test]
    fn test_high_memory_is_critical() {
        let tracker = DeviationTracker::default();
        tracker.observe(&fact("hog", 1.0, 900));

        let record = tracker.last().unwrap();
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.metric, DeviationMetric::Memory);
        assert_eq!(record.process_name, "hog");
        assert_eq!(record.value, 900.0);
    }

    #[test]
    fn test_moderate_cpu_is_warning_on_cpu() {
        let tracker = DeviationTracker::default();
        tracker.observe(&fact("spin", 75.0, 10));

        let record = tracker.last().unwrap();
        assert_eq!(record.severity, Severity::Warning);
        assert_eq!(record.metric, DeviationMetric::Cpu);
        assert_eq!(record.value, 75.0);
    }

    #[test]
    fn test_critical_cpu_beats_warning_memory() {
        let t = DeviationThresholds::default();
        let (metric, _, severity) = t.evaluate(&fact("both", 95.0, 600)).unwrap();
        assert_eq!(metric, DeviationMetric::Cpu);
        assert_eq!(severity, Severity::Critical);
    }

    #[test]
    fn test_last_writer_wins() {
        let tracker = DeviationTracker::default();
        tracker.observe(&fact("first", 99.0, 10));
        tracker.observe(&fact("second", 71.0, 10));
        tracker.observe(&fact("calm", 1.0, 10));

        let record = tracker.last().unwrap();
        assert_eq!(record.process_name, "second");
        assert_eq!(record.severity, Severity::Warning);
    }

    #[test]
    fn test_serializes_lowercase() {
        let tracker = DeviationTracker::default();
        tracker.observe(&fact("hog", 1.0, 900));
        let json = serde_json::to_value(tracker.last().unwrap()).unwrap();
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["metric"], "memory");
    }
}

//! Per-UE execution statistics served by `/get_ue_log`.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestRun {
    pub input_size: u64,
    /// Seconds.
    pub execution_duration: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default)]
struct UeStats {
    total_input_size: u64,
    total_execution_duration: f64,
    total_executions: u64,
    latest_run: Option<LatestRun>,
}

/// Snapshot returned for one UE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeRunLog {
    pub node_id: String,
    pub k8s_pod_name: String,
    pub model_name: String,
    pub ue_id: String,
    pub total_input_size: u64,
    pub total_execution_duration: f64,
    pub total_executions: u64,
    pub average_execution_duration: f64,
    pub latest_run: Option<LatestRun>,
}

pub struct RunLog {
    node_id: String,
    k8s_pod_name: String,
    model_name: String,
    entries: DashMap<String, UeStats>,
}

impl RunLog {
    pub fn new(node_id: impl Into<String>, k8s_pod_name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            k8s_pod_name: k8s_pod_name.into(),
            model_name: model_name.into(),
            entries: DashMap::new(),
        }
    }

    pub fn record(&self, ue_id: &str, input_size: u64, execution_duration: f64) {
        let mut stats = self.entries.entry(ue_id.to_string()).or_default();
        stats.total_input_size += input_size;
        stats.total_execution_duration += execution_duration;
        stats.total_executions += 1;
        stats.latest_run = Some(LatestRun {
            input_size,
            execution_duration,
            timestamp: unix_seconds(),
        });
    }

    pub fn get(&self, ue_id: &str) -> Option<UeRunLog> {
        let stats = self.entries.get(ue_id)?;
        let average = if stats.total_executions == 0 {
            0.0
        } else {
            stats.total_execution_duration / stats.total_executions as f64
        };
        Some(UeRunLog {
            node_id: self.node_id.clone(),
            k8s_pod_name: self.k8s_pod_name.clone(),
            model_name: self.model_name.clone(),
            ue_id: ue_id.to_string(),
            total_input_size: stats.total_input_size,
            total_execution_duration: stats.total_execution_duration,
            total_executions: stats.total_executions,
            average_execution_duration: average,
            latest_run: stats.latest_run.clone(),
        })
    }

    pub fn ue_count(&self) -> usize {
        self.entries.len()
    }
}

pub(crate) fn unix_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unknown_ue_has_no_log() {
        let log = RunLog::new("node", "pod", "model");
        assert!(log.get("nobody").is_none());
    }

    #[test]
    fn test_record_accumulates_and_averages() {
        let log = RunLog::new("node", "pod", "microsoft/resnet-50");
        log.record("ue-1", 100, 0.5);
        log.record("ue-1", 300, 1.5);
        log.record("ue-2", 10, 0.1);

        let entry = log.get("ue-1").unwrap();
        assert_eq!(entry.total_input_size, 400);
        assert_eq!(entry.total_executions, 2);
        assert!((entry.total_execution_duration - 2.0).abs() < 1e-9);
        assert!((entry.average_execution_duration - 1.0).abs() < 1e-9);
        assert_eq!(entry.model_name, "microsoft/resnet-50");

        let latest = entry.latest_run.unwrap();
        assert_eq!(latest.input_size, 300);
        assert!(latest.timestamp > 0.0);
        assert_eq!(log.ue_count(), 2);
    }

    #[test]
    fn test_concurrent_records() {
        let log = Arc::new(RunLog::new("node", "pod", "model"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        log.record("ue", 1, 0.01);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.get("ue").unwrap().total_executions, 400);
    }
}

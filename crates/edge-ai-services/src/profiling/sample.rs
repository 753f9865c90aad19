//! Profiling sample types exchanged between a model service and its clients

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One profiling run's summary statistics.
///
/// Memory fields are byte counts and may be negative for the `self_*`
/// variants, which record the delta across the profiled call (freed memory
/// shows up as a negative delta). Time fields are microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSample {
    pub name: String,
    pub device_type: String,
    pub device_name: String,
    #[serde(default)]
    pub cpu_memory_usage: i64,
    #[serde(default)]
    pub self_cpu_memory_usage: i64,
    #[serde(default)]
    pub device_memory_usage: i64,
    #[serde(default)]
    pub self_device_memory_usage: i64,
    #[serde(default)]
    pub cpu_time_total: f64,
    #[serde(default)]
    pub self_cpu_time_total: f64,
    #[serde(default)]
    pub device_time_total: f64,
    #[serde(default)]
    pub self_device_time_total: f64,
}

impl ProfileSample {
    /// Sample with identity fields set and every statistic at zero.
    pub fn empty(name: impl Into<String>, device_type: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_type: device_type.into(),
            device_name: device_name.into(),
            cpu_memory_usage: 0,
            self_cpu_memory_usage: 0,
            device_memory_usage: 0,
            self_device_memory_usage: 0,
            cpu_time_total: 0.0,
            self_cpu_time_total: 0.0,
            device_time_total: 0.0,
            self_device_time_total: 0.0,
        }
    }
}

/// JSON body returned by `/profile_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEnvelope {
    pub ue_id: String,
    #[serde(default)]
    pub profile_result: Option<ProfileSample>,
    #[serde(default)]
    pub model_results: Value,
}

/// What a client observed for a single profiling request: the body plus the
/// node metadata the service attaches as response headers.
#[derive(Debug, Clone, Default)]
pub struct ProfiledResponse {
    pub profile_result: Option<ProfileSample>,
    pub node_id: Option<String>,
    pub k8s_pod_name: Option<String>,
    /// Server-side processing time in seconds (`X-Process-Time`).
    pub process_time: Option<f64>,
}

impl ProfiledResponse {
    pub fn from_envelope(envelope: ProfileEnvelope) -> Self {
        Self {
            profile_result: envelope.profile_result,
            ..Default::default()
        }
    }

    pub fn with_node(mut self, node_id: Option<String>, k8s_pod_name: Option<String>) -> Self {
        self.node_id = node_id;
        self.k8s_pod_name = k8s_pod_name;
        self
    }
}

/// Description of the `profile_result` object used by the `/help` endpoint.
pub fn profile_output_json_spec() -> Value {
    serde_json::json!({
        "ue_id": "unique execution ID",
        "profile_result": {
            "name": "name of the profile event",
            "device_type": "type of device used (e.g., CPU, CUDA, ...)",
            "device_name": "name of the device used",
            "cpu_memory_usage": "CPU memory usage in bytes",
            "self_cpu_memory_usage": "self CPU memory usage in bytes",
            "device_memory_usage": "device memory usage in bytes",
            "self_device_memory_usage": "self device memory usage in bytes",
            "cpu_time_total": "total CPU time in microseconds",
            "self_cpu_time_total": "self total CPU time in microseconds",
            "device_time_total": "total device time in microseconds",
            "self_device_time_total": "self total device time in microseconds",
        },
        "model_results": "the AI service model results",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_without_profile_result() {
        let envelope: ProfileEnvelope =
            serde_json::from_str(r#"{"ue_id": "ue-1", "model_results": [1, 2]}"#).unwrap();
        assert!(envelope.profile_result.is_none());
        assert_eq!(envelope.model_results, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_sample_accepts_float_times_and_negative_memory() {
        let sample: ProfileSample = serde_json::from_str(
            r#"{
                "name": "model_inference",
                "device_type": "CPU",
                "device_name": "cpu",
                "cpu_memory_usage": 4096,
                "self_cpu_memory_usage": -1024,
                "cpu_time_total": 1532.5
            }"#,
        )
        .unwrap();
        assert_eq!(sample.self_cpu_memory_usage, -1024);
        assert_eq!(sample.cpu_time_total, 1532.5);
        assert_eq!(sample.device_time_total, 0.0);
    }
}

//! Running aggregation of profiling samples for one (node, method) pair.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use super::ledger::{EntryKind, LedgerEntry, ResourceProfile, XaiProfile};
use super::sample::{ProfileSample, ProfiledResponse};
use super::ProfilingError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const US_PER_MS: f64 = 1000.0;

/// Best-known values across every sample seen so far.
///
/// `self_cpu_memory_usage` and `self_device_memory_usage` keep the sample
/// with the largest magnitude (a large negative delta beats a small
/// positive one). All other fields keep the plain maximum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningAggregate {
    pub cpu_memory_usage: i64,
    pub self_cpu_memory_usage: i64,
    pub device_memory_usage: i64,
    pub self_device_memory_usage: i64,
    pub cpu_time_total: f64,
    pub self_cpu_time_total: f64,
    pub device_time_total: f64,
    pub self_device_time_total: f64,
}

impl RunningAggregate {
    fn merge(&mut self, sample: &ProfileSample) {
        keep_max(&mut self.cpu_memory_usage, sample.cpu_memory_usage);
        keep_max_magnitude(&mut self.self_cpu_memory_usage, sample.self_cpu_memory_usage);
        keep_max(&mut self.device_memory_usage, sample.device_memory_usage);
        keep_max_magnitude(&mut self.self_device_memory_usage, sample.self_device_memory_usage);
        keep_max(&mut self.cpu_time_total, sample.cpu_time_total);
        keep_max(&mut self.self_cpu_time_total, sample.self_cpu_time_total);
        keep_max(&mut self.device_time_total, sample.device_time_total);
        keep_max(&mut self.self_device_time_total, sample.self_device_time_total);
    }

    fn to_resource_profile(&self, execution_time_ms: f64) -> ResourceProfile {
        ResourceProfile {
            cpu_time_ms: self.cpu_time_total / US_PER_MS,
            device_time_ms: self.device_time_total / US_PER_MS,
            cpu_memory_usage_mb: self.cpu_memory_usage as f64 / BYTES_PER_MB,
            self_cpu_memory_usage_mb: self.self_cpu_memory_usage as f64 / BYTES_PER_MB,
            device_memory_usage_mb: self.device_memory_usage as f64 / BYTES_PER_MB,
            self_device_memory_usage_mb: self.self_device_memory_usage as f64 / BYTES_PER_MB,
            execution_time_ms,
            ..Default::default()
        }
    }
}

// Strict `>`: on ties the first value seen stays.
fn keep_max<T: PartialOrd + Copy>(stored: &mut T, candidate: T) {
    if candidate > *stored {
        *stored = candidate;
    }
}

fn keep_max_magnitude(stored: &mut i64, candidate: i64) {
    if candidate.unsigned_abs() > stored.unsigned_abs() {
        *stored = candidate;
    }
}

/// Identity fields latched from the first response that carries them.
#[derive(Debug, Clone, Default, PartialEq)]
struct Identity {
    profile_name: Option<String>,
    device_type: Option<String>,
    device_name: Option<String>,
    node_id: Option<String>,
    k8s_pod_name: Option<String>,
}

/// Folds the profiling responses of one session into a single aggregate.
#[derive(Debug, Clone)]
pub struct ProfileAccumulator {
    started_at: Instant,
    initialization_duration_secs: f64,
    xai_method: Option<String>,
    response_counter: u64,
    identity: Identity,
    aggregate: RunningAggregate,
}

impl ProfileAccumulator {
    pub fn new(initialization_duration_secs: f64) -> Self {
        Self {
            started_at: Instant::now(),
            initialization_duration_secs,
            xai_method: None,
            response_counter: 0,
            identity: Identity::default(),
            aggregate: RunningAggregate::default(),
        }
    }

    /// Accumulator whose entry lands in the node's `xai` list under `method`.
    pub fn for_xai_method(initialization_duration_secs: f64, method: impl Into<String>) -> Self {
        Self {
            xai_method: Some(method.into()),
            ..Self::new(initialization_duration_secs)
        }
    }

    /// Merge one response. Absent responses, or responses without a
    /// profile result, leave the accumulator untouched.
    pub fn process_new_response(&mut self, response: Option<&ProfiledResponse>) {
        let Some(response) = response else { return };
        let Some(sample) = response.profile_result.as_ref() else { return };

        latch(&mut self.identity.profile_name, Some(&sample.name));
        latch(&mut self.identity.device_type, Some(&sample.device_type));
        latch(&mut self.identity.device_name, Some(&sample.device_name));
        latch(&mut self.identity.node_id, response.node_id.as_ref());
        latch(&mut self.identity.k8s_pod_name, response.k8s_pod_name.as_ref());

        self.aggregate.merge(sample);
        self.response_counter += 1;
    }

    pub fn response_count(&self) -> u64 {
        self.response_counter
    }

    pub fn aggregate(&self) -> &RunningAggregate {
        &self.aggregate
    }

    pub fn node_id(&self) -> Option<&str> {
        self.identity.node_id.as_deref()
    }

    pub fn xai_method(&self) -> Option<&str> {
        self.xai_method.as_deref()
    }

    /// Package the aggregate as a ledger entry, using the wall-clock time
    /// since construction for the mean per-request latency.
    pub fn finalize(&self) -> Result<LedgerEntry, ProfilingError> {
        self.finalize_with_elapsed(self.started_at.elapsed())
    }

    fn finalize_with_elapsed(&self, elapsed: Duration) -> Result<LedgerEntry, ProfilingError> {
        if self.response_counter == 0 {
            return Err(ProfilingError::NoSamples);
        }
        let node_id = self.identity.node_id.clone().ok_or(ProfilingError::MissingNodeId)?;

        let resources = self.aggregate.to_resource_profile(self.mean_latency_ms(elapsed));
        let kind = match &self.xai_method {
            Some(method) => EntryKind::Xai(XaiProfile {
                xai_method: method.clone(),
                resources,
            }),
            None => EntryKind::Inference(resources),
        };

        Ok(LedgerEntry {
            node_id,
            device_type: self.identity.device_type.clone().unwrap_or_default(),
            device_name: self.identity.device_name.clone().unwrap_or_default(),
            initialization_time_ms: self.initialization_duration_secs * 1000.0,
            kind,
        })
    }

    fn mean_latency_ms(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() / self.response_counter as f64 * 1000.0
    }

    /// Printable report of the session so far.
    pub fn summary(&self) -> String {
        let elapsed = self.started_at.elapsed();
        let id = &self.identity;
        let agg = &self.aggregate;
        let unknown = "unknown".to_string();
        let mut out = String::new();

        let _ = writeln!(out, "--------- PROFILE EVENT ---------");
        let _ = writeln!(out, "Name: {}", id.profile_name.as_ref().unwrap_or(&unknown));
        let _ = writeln!(out, "Device Type: {}", id.device_type.as_ref().unwrap_or(&unknown));
        let _ = writeln!(out, "Device Name: {}", id.device_name.as_ref().unwrap_or(&unknown));
        let _ = writeln!(out, "Node ID: {}", id.node_id.as_ref().unwrap_or(&unknown));
        let _ = writeln!(out, "K8S_POD_NAME: {}", id.k8s_pod_name.as_ref().unwrap_or(&unknown));
        if let Some(method) = &self.xai_method {
            let _ = writeln!(out, "XAI Method: {}", method);
        }

        let _ = writeln!(out, "--------- LATENCY RESULT ---------");
        let _ = writeln!(out, "Service Initialization Duration: {:.2} seconds", self.initialization_duration_secs);
        let _ = writeln!(out, "Total Requests: {}", self.response_counter);
        let _ = writeln!(out, "Total Time Taken: {:.2} seconds", elapsed.as_secs_f64());
        if self.response_counter > 0 {
            let _ = writeln!(out, "Average Time Taken: {:.2} ms", self.mean_latency_ms(elapsed));
        }

        let _ = writeln!(out, "--------- RESOURCE USAGE ---------");
        let _ = writeln!(out, "CPU Memory Usage: {:.2} MB", agg.cpu_memory_usage as f64 / BYTES_PER_MB);
        let _ = writeln!(out, "Self CPU Memory Usage: {:.2} MB", agg.self_cpu_memory_usage as f64 / BYTES_PER_MB);
        let _ = writeln!(out, "Device Memory Usage: {:.2} MB", agg.device_memory_usage as f64 / BYTES_PER_MB);
        let _ = writeln!(out, "Self Device Memory Usage: {:.2} MB", agg.self_device_memory_usage as f64 / BYTES_PER_MB);
        let _ = writeln!(out, "CPU Time Total: {:.2} ms", agg.cpu_time_total / US_PER_MS);
        let _ = writeln!(out, "Self CPU Time Total: {:.2} ms", agg.self_cpu_time_total / US_PER_MS);
        let _ = writeln!(out, "Device Time Total: {:.2} ms", agg.device_time_total / US_PER_MS);
        let _ = writeln!(out, "Self Device Time Total: {:.2} ms", agg.self_device_time_total / US_PER_MS);
        out
    }
}

fn latch(slot: &mut Option<String>, value: Option<&String>) {
    if slot.is_none() {
        if let Some(value) = value {
            *slot = Some(value.clone());
        }
    }
}

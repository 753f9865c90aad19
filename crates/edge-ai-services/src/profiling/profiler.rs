//! In-process profiler producing one [`ProfileSample`] per wrapped call.
//!
//! CPU time comes from `getrusage` (process-wide for the totals, calling
//! thread for the `self_*` time), resident memory from sysinfo and device
//! memory from NVML when a GPU is present. Device kernel time is not
//! sampled and stays zero.

use std::sync::Mutex;

use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeValLike;
use nvml_wrapper::Nvml;
use sysinfo::{Pid, System};
use tracing::{debug, info};

use super::sample::ProfileSample;

pub struct Profiler {
    system: Mutex<System>,
    pid: Option<Pid>,
    nvml: Option<Nvml>,
    device_type: String,
    device_name: String,
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    rss_bytes: i64,
    device_used_bytes: i64,
    process_cpu_us: i64,
    thread_cpu_us: i64,
}

impl Profiler {
    /// Probe the host once: GPU through NVML, otherwise the CPU brand.
    pub fn new() -> Self {
        match Nvml::init() {
            Ok(nvml) => {
                let name = nvml
                    .device_by_index(0)
                    .and_then(|device| device.name())
                    .ok();
                match name {
                    Some(name) => {
                        info!("Profiler using CUDA device: {}", name);
                        Self::build(Some(nvml), "CUDA".to_string(), name)
                    }
                    None => Self::cpu_only(),
                }
            }
            Err(e) => {
                debug!("NVML unavailable ({}), profiling CPU only", e);
                Self::cpu_only()
            }
        }
    }

    pub fn cpu_only() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        let brand = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "cpu".to_string());
        Self::build(None, "CPU".to_string(), brand)
    }

    fn build(nvml: Option<Nvml>, device_type: String, device_name: String) -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
            nvml,
            device_type,
            device_name,
        }
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Run `f` on the current thread and measure it.
    pub fn profile<T>(&self, name: &str, f: impl FnOnce() -> T) -> (T, ProfileSample) {
        let before = self.snapshot();
        let output = f();
        let after = self.snapshot();

        let sample = ProfileSample {
            name: name.to_string(),
            device_type: self.device_type.clone(),
            device_name: self.device_name.clone(),
            cpu_memory_usage: after.rss_bytes,
            self_cpu_memory_usage: after.rss_bytes - before.rss_bytes,
            device_memory_usage: after.device_used_bytes,
            self_device_memory_usage: after.device_used_bytes - before.device_used_bytes,
            cpu_time_total: (after.process_cpu_us - before.process_cpu_us).max(0) as f64,
            self_cpu_time_total: (after.thread_cpu_us - before.thread_cpu_us).max(0) as f64,
            device_time_total: 0.0,
            self_device_time_total: 0.0,
        };
        (output, sample)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            rss_bytes: self.resident_bytes(),
            device_used_bytes: self.device_used_bytes(),
            process_cpu_us: cpu_time_us(UsageWho::RUSAGE_SELF),
            thread_cpu_us: thread_cpu_time_us(),
        }
    }

    fn resident_bytes(&self) -> i64 {
        let Some(pid) = self.pid else { return 0 };
        let mut system = self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory() as i64).unwrap_or(0)
    }

    fn device_used_bytes(&self) -> i64 {
        self.nvml
            .as_ref()
            .and_then(|nvml| nvml.device_by_index(0).ok())
            .and_then(|device| device.memory_info().ok())
            .map(|memory| memory.used as i64)
            .unwrap_or(0)
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

fn cpu_time_us(who: UsageWho) -> i64 {
    getrusage(who)
        .map(|usage| usage.user_time().num_microseconds() + usage.system_time().num_microseconds())
        .unwrap_or(0)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn thread_cpu_time_us() -> i64 {
    cpu_time_us(UsageWho::RUSAGE_THREAD)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn thread_cpu_time_us() -> i64 {
    cpu_time_us(UsageWho::RUSAGE_SELF)
}

//! Shared state handed to every model service handler.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::config::Config;
use crate::model_runtime::InferenceModel;
use crate::profiling::Profiler;

use super::run_log::{unix_seconds, RunLog};

/// Identity reported in the `X-NODE-ID` / `X-K8S-POD-NAME` headers.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub k8s_pod_name: String,
}

#[derive(Clone)]
pub struct ServiceState {
    pub model: Arc<dyn InferenceModel>,
    pub profiler: Arc<Profiler>,
    pub run_log: Arc<RunLog>,
    pub node: Arc<NodeIdentity>,
    started: Instant,
    script_start_time: f64,
    initialization_duration: Arc<OnceLock<f64>>,
}

impl ServiceState {
    /// `started` is when the process began loading, so the initialization
    /// duration covers model construction.
    pub fn new(cfg: &Config, model: Arc<dyn InferenceModel>, profiler: Arc<Profiler>, started: Instant) -> Self {
        let script_start_time = unix_seconds() - started.elapsed().as_secs_f64();
        Self {
            run_log: Arc::new(RunLog::new(cfg.node_id.clone(), cfg.k8s_pod_name.clone(), model.name().to_string())),
            model,
            profiler,
            node: Arc::new(NodeIdentity {
                node_id: cfg.node_id.clone(),
                k8s_pod_name: cfg.k8s_pod_name.clone(),
            }),
            started,
            script_start_time,
            initialization_duration: Arc::new(OnceLock::new()),
        }
    }

    /// Record the load time once; later calls keep the first value.
    pub fn mark_initialized(&self) -> f64 {
        *self
            .initialization_duration
            .get_or_init(|| self.started.elapsed().as_secs_f64())
    }

    /// Seconds from process start to model ready, `None` until initialized.
    pub fn initialization_duration(&self) -> Option<f64> {
        self.initialization_duration.get().copied().filter(|d| *d > 0.0)
    }

    pub fn script_start_time(&self) -> f64 {
        self.script_start_time
    }

    pub fn supports_xai(&self) -> bool {
        !self.model.xai_methods().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_test_config;
    use crate::model_runtime::EchoModel;

    #[test]
    fn test_initialization_is_recorded_once() {
        let cfg = create_test_config();
        let started = Instant::now() - std::time::Duration::from_millis(50);
        let state = ServiceState::new(&cfg, Arc::new(EchoModel::new("echo")), Arc::new(Profiler::cpu_only()), started);

        assert!(state.initialization_duration().is_none());
        let first = state.mark_initialized();
        assert!(first >= 0.05);
        assert_eq!(state.mark_initialized(), first);
        assert_eq!(state.initialization_duration(), Some(first));
        assert!(state.script_start_time() > 0.0);
        assert!(!state.supports_xai());
    }
}

// edge-ai-services/src/lib.rs

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model_runtime;
pub mod profiling;
pub mod registry;
pub mod service;
pub mod telemetry;

// Public API exports
pub use config::{Config, ModelKind};
pub use error::ApiError;
pub use model_runtime::{build_model, InferenceModel, ModelInput};
pub use profiling::{LedgerStore, ProfileAccumulator, Profiler, ServiceData};
pub use registry::{run_registry_server, RegistryDatabase};
pub use service::{run_model_service, ServiceState};

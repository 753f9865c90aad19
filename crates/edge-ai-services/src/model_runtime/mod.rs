//! Model seam for the inference service.
//!
//! Every wrapped model implements [`InferenceModel`]. The service only sees
//! the trait object, so the built-in models below and any future adapter are
//! interchangeable:
//! - [`EchoModel`]: deterministic, describes its input
//! - [`UpstreamModel`]: forwards the form to a separate inference backend
pub mod model_trait;
pub mod echo_model;
pub mod upstream_model;

pub use model_trait::{Explanation, InferenceModel, ModelInput, ModelMetadata, UploadedFile, XAI_METHOD_ALIAS, XAI_METHOD_FIELD};
pub use echo_model::EchoModel;
pub use upstream_model::UpstreamModel;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::config::{Config, ModelKind};

/// Instantiate the model selected by `MODEL_KIND`.
///
/// Must be called from inside a Tokio runtime when the upstream model is
/// selected; its HTTP calls are driven by the current runtime handle.
pub fn build_model(cfg: &Config) -> anyhow::Result<Arc<dyn InferenceModel>> {
    let model: Arc<dyn InferenceModel> = match cfg.model_kind {
        ModelKind::Echo => Arc::new(EchoModel::new(cfg.model_name.clone())),
        ModelKind::Upstream => {
            let url = cfg
                .upstream_url
                .clone()
                .context("UPSTREAM_URL is required for the upstream model")?;
            let handle = tokio::runtime::Handle::try_current()
                .context("The upstream model must be built inside a Tokio runtime")?;
            Arc::new(UpstreamModel::new(
                cfg.model_name.clone(),
                url,
                Duration::from_secs(cfg.request_timeout_seconds),
                cfg.xai_methods.clone(),
                handle,
            )?)
        }
    };

    let metadata = model.metadata();
    info!(
        "Loaded model '{}' (runtime: {}, xai: {})",
        metadata.model_name, metadata.runtime_name, metadata.supports_xai
    );
    Ok(model)
}

//! Model backed by a separate inference backend reached over HTTP.
//!
//! The form received by this service is forwarded to `<base_url>/run`, or to
//! `<base_url>/xai_model/run` with the method in `gradcam_method_name`. The
//! backend's `model_results` (and `xai_results` for explanations) are
//! returned.

use std::time::Duration;

use anyhow::Context;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::debug;

use super::model_trait::{Explanation, InferenceModel, ModelInput, ModelMetadata, XAI_METHOD_ALIAS, XAI_METHOD_FIELD};

pub struct UpstreamModel {
    name: String,
    base_url: String,
    client: reqwest::Client,
    handle: Handle,
    xai_methods: Vec<String>,
}

impl UpstreamModel {
    /// `handle` drives the HTTP calls; `infer` must run on a thread that is
    /// allowed to block (e.g. inside `spawn_blocking`).
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        xai_methods: Vec<String>,
        handle: Handle,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build upstream HTTP client")?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            handle,
            xai_methods,
        })
    }

    fn forward(&self, path: &str, input: &ModelInput, method: Option<&str>) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let form = build_form(input, method)?;
        debug!("Forwarding {} bytes to {}", input.input_size(), url);

        self.handle.block_on(async {
            let response = self
                .client
                .post(&url)
                .multipart(form)
                .send()
                .await
                .with_context(|| format!("Upstream request to {} failed", url))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Upstream returned {}: {}", status, body);
            }

            response.json().await.context("Upstream returned invalid JSON")
        })
    }
}

/// `model_results` of a backend reply, or the whole reply when absent.
fn model_results(body: &mut Value) -> Value {
    if let Some(results) = body.get_mut("model_results") {
        return results.take();
    }
    body.take()
}

pub(crate) fn build_form(input: &ModelInput, method: Option<&str>) -> anyhow::Result<Form> {
    let mut fields = input.fields.clone();
    if let Some(method) = method {
        fields.remove(XAI_METHOD_ALIAS);
        fields.insert(XAI_METHOD_FIELD.to_string(), method.to_string());
    }

    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in &input.files {
        let mut part = Part::bytes(file.data.to_vec());
        if let Some(file_name) = &file.file_name {
            part = part.file_name(file_name.clone());
        }
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .with_context(|| format!("Invalid content type '{}'", content_type))?;
        }
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

impl InferenceModel for UpstreamModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, input: &ModelInput) -> anyhow::Result<Value> {
        let mut body = self.forward("/run", input, None)?;
        Ok(model_results(&mut body))
    }

    fn input_form_spec(&self) -> Value {
        json!({
            "<form fields>": {
                "type": "file upload or string",
                "description": format!("Forwarded unchanged to the inference backend at {}", self.base_url),
                "required": false,
            }
        })
    }

    fn output_json_spec(&self) -> Value {
        json!({
            "ue_id": "unique execution ID",
            "model_results": "results returned by the inference backend",
        })
    }

    fn xai_methods(&self) -> Vec<String> {
        self.xai_methods.clone()
    }

    fn explain(&self, input: &ModelInput, method: &str) -> anyhow::Result<Explanation> {
        if !self.xai_methods.iter().any(|m| m == method) {
            anyhow::bail!("Unsupported XAI method '{}'. Supported: {:?}", method, self.xai_methods);
        }
        let mut body = self.forward("/xai_model/run", input, Some(method))?;
        let xai_results = body
            .as_object_mut()
            .and_then(|fields| fields.remove("xai_results"))
            .unwrap_or_else(|| json!({ "xai_method": method }));
        Ok(Explanation {
            model_results: model_results(&mut body),
            xai_results,
        })
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_name: self.name.clone(),
            runtime_name: "upstream-http".to_string(),
            supports_xai: !self.xai_methods.is_empty(),
        }
    }
}

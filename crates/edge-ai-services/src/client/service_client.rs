//! HTTP client for a running model service.

use std::time::Duration;

use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::model_runtime::upstream_model::build_form;
use crate::model_runtime::{ModelInput, XAI_METHOD_FIELD};
use crate::profiling::{ProfileEnvelope, ProfiledResponse};
use crate::service::{NODE_ID_HEADER, POD_NAME_HEADER, PROCESS_TIME_HEADER};

#[derive(Debug, Clone)]
pub struct ServiceClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build service HTTP client")?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Seconds the service spent loading its model.
    pub async fn initialization_duration(&self) -> anyhow::Result<f64> {
        let body: Value = self.get_json("/initialization_duration").await?;
        body.get("initialization_duration")
            .and_then(Value::as_f64)
            .context("initialization_duration missing from response")
    }

    pub async fn help(&self) -> anyhow::Result<Value> {
        self.get_json("/help").await
    }

    /// XAI methods advertised by `/help`; empty when the service has no
    /// explanation routes.
    pub async fn xai_methods(&self) -> anyhow::Result<Vec<String>> {
        let help = self.help().await?;
        let methods: Vec<String> = help
            .pointer(&format!("/endpoints/~1xai_model~1run/parameters/{}/enum", XAI_METHOD_FIELD))
            .and_then(Value::as_array)
            .map(|methods| methods.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        debug!("{} advertises XAI methods {:?}", self.base_url, methods);
        Ok(methods)
    }

    /// `None` when the service has no log for `ue_id`.
    pub async fn ue_log(&self, ue_id: &str) -> anyhow::Result<Option<Value>> {
        let url = self.url("/get_ue_log");
        let response = self
            .http_client
            .get(&url)
            .query(&[("ue_id", ue_id)])
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(ensure_success(&url, response).await?.json().await?))
    }

    /// Run the model once; returns the whole `{ue_id, model_results}` body.
    pub async fn run(&self, input: &ModelInput, xai_method: Option<&str>) -> anyhow::Result<Value> {
        let path = match xai_method {
            Some(_) => "/xai_model/run",
            None => "/run",
        };
        let response = self.post_form(path, input, xai_method).await?;
        Ok(response.json().await?)
    }

    /// One profiling request, with the node identity taken from the
    /// response headers.
    pub async fn profile_run(&self, input: &ModelInput, xai_method: Option<&str>) -> anyhow::Result<ProfiledResponse> {
        let path = match xai_method {
            Some(_) => "/xai_model/profile_run",
            None => "/profile_run",
        };
        let response = self.post_form(path, input, xai_method).await?;
        let headers = response.headers().clone();
        let envelope: ProfileEnvelope = response
            .json()
            .await
            .context("Profiling response is not a profile envelope")?;

        let mut profiled = ProfiledResponse::from_envelope(envelope)
            .with_node(header(&headers, NODE_ID_HEADER), header(&headers, POD_NAME_HEADER));
        profiled.process_time = header(&headers, PROCESS_TIME_HEADER).and_then(|v| v.parse().ok());
        debug!("Profiled response from {:?} in {:?}s", profiled.node_id, profiled.process_time);
        Ok(profiled)
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = self.url(path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        Ok(ensure_success(&url, response).await?.json().await?)
    }

    async fn post_form(&self, path: &str, input: &ModelInput, method: Option<&str>) -> anyhow::Result<Response> {
        let url = self.url(path);
        let form = build_form(input, method)?;
        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        ensure_success(&url, response).await
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub(crate) async fn ensure_success(url: &str, response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{} returned {}: {}", url, status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> ModelInput {
        let mut input = ModelInput::default();
        input.fields.insert("ue_id".to_string(), "123456".to_string());
        input
    }

    #[tokio::test]
    async fn test_profile_run_reads_headers() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/profile_run")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("X-NODE-ID", "node-a")
            .with_header("X-K8S-POD-NAME", "pod-a")
            .with_header("X-Process-Time", "0.25")
            .with_body(
                json!({
                    "ue_id": "123456",
                    "profile_result": {
                        "name": "model_inference",
                        "device_type": "CPU",
                        "device_name": "cpu",
                        "cpu_memory_usage": 10,
                        "self_cpu_memory_usage": -5,
                        "device_memory_usage": 0,
                        "self_device_memory_usage": 0,
                        "cpu_time_total": 100.0,
                        "self_cpu_time_total": 90.0,
                        "device_time_total": 0.0,
                        "self_device_time_total": 0.0
                    },
                    "model_results": {}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ServiceClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let response = client.profile_run(&input(), None).await.unwrap();

        assert_eq!(response.node_id.as_deref(), Some("node-a"));
        assert_eq!(response.k8s_pod_name.as_deref(), Some("pod-a"));
        assert_eq!(response.process_time, Some(0.25));
        assert_eq!(response.profile_result.unwrap().self_cpu_memory_usage, -5);
    }

    #[tokio::test]
    async fn test_initialization_duration_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/initialization_duration")
            .with_status(500)
            .with_body(r#"{"error": "Model not initialized."}"#)
            .create_async()
            .await;

        let client = ServiceClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = client.initialization_duration().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_ue_log_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/get_ue_log")
            .match_query(mockito::Matcher::UrlEncoded("ue_id".into(), "nobody".into()))
            .with_status(404)
            .with_body(r#"{"error": "No logs found for UE_ID: nobody"}"#)
            .create_async()
            .await;

        let client = ServiceClient::new(server.url(), Duration::from_secs(5)).unwrap();
        assert!(client.ue_log("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_xai_methods_from_help() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/help")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "endpoints": {
                        "/model/run": {"method": "POST"},
                        "/xai_model/run": {
                            "method": "POST",
                            "parameters": {
                                "gradcam_method_name": {"type": "string", "enum": ["GradCAM", "HiResCAM"]}
                            }
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ServiceClient::new(server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(client.xai_methods().await.unwrap(), vec!["GradCAM", "HiResCAM"]);
    }

    #[tokio::test]
    async fn test_xai_methods_empty_without_xai_routes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/help")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"endpoints": {"/model/run": {"method": "POST"}}}"#)
            .create_async()
            .await;

        let client = ServiceClient::new(server.url(), Duration::from_secs(5)).unwrap();
        assert!(client.xai_methods().await.unwrap().is_empty());
    }
}

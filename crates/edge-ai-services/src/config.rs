// edge-ai-services/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};
use sysinfo::System;

/// Which [`crate::model_runtime::InferenceModel`] the service wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Echo,
    Upstream,
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "echo" => Ok(ModelKind::Echo),
            "upstream" => Ok(ModelKind::Upstream),
            other => Err(anyhow::anyhow!("Unknown MODEL_KIND '{}', expected 'echo' or 'upstream'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: String,
    pub k8s_pod_name: String,
    pub container_name: String,
    pub api_host: String,
    pub api_port: u16,
    pub model_name: String,
    pub model_kind: ModelKind,
    pub upstream_url: Option<String>,
    pub xai_methods: Vec<String>,
    pub max_upload_mb: usize,
    pub request_timeout_seconds: u64,
    pub registry_host: String,
    pub registry_port: u16,
    pub registry_db_path: PathBuf,
    pub service_url: String,
    pub registry_url: String,
    pub ledger_path: PathBuf,
    pub ue_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let container_name = env::var("HOSTNAME").unwrap_or_else(|_| "UNKNOWN".into());
        let node_id = env::var("NODE_ID").unwrap_or_else(|_| Self::detect_node_id());

        let model_kind: ModelKind = env::var("MODEL_KIND")
            .unwrap_or_else(|_| "echo".into())
            .parse()?;
        let upstream_url = env::var("UPSTREAM_URL").ok().filter(|url| !url.trim().is_empty());
        if model_kind == ModelKind::Upstream && upstream_url.is_none() {
            return Err(anyhow::anyhow!("MODEL_KIND=upstream requires UPSTREAM_URL to be set"));
        }

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "9000".into())
            .parse()
            .context("API_PORT must be a port number")?;

        Ok(Self {
            node_id,
            k8s_pod_name: env::var("K8S_POD_NAME").unwrap_or_else(|_| "UNKNOWN".into()),
            container_name,
            api_host,
            api_port,
            model_name: env::var("MODEL_NAME").unwrap_or_else(|_| "echo".into()),
            model_kind,
            upstream_url,
            xai_methods: parse_list(&env::var("XAI_METHODS").unwrap_or_default()),
            max_upload_mb: env::var("MAX_UPLOAD_MB")
                .unwrap_or_else(|_| "64".into())
                .parse()
                .context("MAX_UPLOAD_MB must be an integer")?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "600".into())
                .parse()
                .context("REQUEST_TIMEOUT_SECONDS must be an integer")?,
            registry_host: env::var("REGISTRY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            registry_port: env::var("REGISTRY_PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .context("REGISTRY_PORT must be a port number")?,
            registry_db_path: env::var("REGISTRY_DB_PATH")
                .unwrap_or_else(|_| "./data/registry.db".into())
                .into(),
            service_url: env::var("SERVICE_URL").unwrap_or_else(|_| "http://localhost:9000".into()),
            registry_url: env::var("REGISTRY_URL").unwrap_or_else(|_| "http://localhost:8000".into()),
            ledger_path: env::var("LEDGER_PATH")
                .unwrap_or_else(|_| "service_data.json".into())
                .into(),
            ue_id: env::var("UE_ID").unwrap_or_else(|_| "123456".into()),
        })
    }

    fn detect_node_id() -> String {
        match System::host_name() {
            Some(host) if !host.is_empty() => {
                info!("NODE_ID not set, using host name: {}", host);
                host
            }
            _ => {
                warn!("NODE_ID not set and host name unavailable");
                "UNKNOWN".to_string()
            }
        }
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Node ID: {}", self.node_id);
        info!("- Pod Name: {}", self.k8s_pod_name);
        info!("- Container: {}", self.container_name);
        info!("- Model: {} ({:?})", self.model_name, self.model_kind);
        if let Some(url) = &self.upstream_url {
            info!("- Upstream URL: {}", url);
        }
        info!("- XAI Methods: {:?}", self.xai_methods);
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Max Upload: {} MB", self.max_upload_mb);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Registry: {}:{} ({})", self.registry_host, self.registry_port, self.registry_db_path.display());
        info!("- Service URL: {}", self.service_url);
        info!("- Registry URL: {}", self.registry_url);
        info!("- Ledger: {}", self.ledger_path.display());
    }

    pub fn service_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid service address {}:{}", self.api_host, self.api_port))
    }

    pub fn registry_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.registry_host, self.registry_port)
            .parse()
            .with_context(|| format!("Invalid registry address {}:{}", self.registry_host, self.registry_port))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) fn create_test_config() -> Config {
    Config {
        node_id: "node-test".to_string(),
        k8s_pod_name: "pod-test".to_string(),
        container_name: "container-test".to_string(),
        api_host: "127.0.0.1".to_string(),
        api_port: 9000,
        model_name: "echo".to_string(),
        model_kind: ModelKind::Echo,
        upstream_url: None,
        xai_methods: Vec::new(),
        max_upload_mb: 64,
        request_timeout_seconds: 600,
        registry_host: "127.0.0.1".to_string(),
        registry_port: 8000,
        registry_db_path: PathBuf::from("./data/registry.db"),
        service_url: "http://localhost:9000".to_string(),
        registry_url: "http://localhost:8000".to_string(),
        ledger_path: PathBuf::from("service_data.json"),
        ue_id: "123456".to_string(),
    }
}

//! HTTP client for the registry API.

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;

use crate::registry::{DocumentFilter, RegistryDocument, StoredDocument};

use super::service_client::ensure_success;

#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build registry HTTP client")?,
        })
    }

    fn collection_url<T: RegistryDocument>(&self) -> String {
        format!("{}{}", self.base_url, T::COLLECTION_ROUTE)
    }

    fn item_url<T: RegistryDocument>(&self, id: &str) -> String {
        format!("{}{}{}", self.base_url, T::ITEM_ROUTE, id)
    }

    pub async fn list<T: RegistryDocument>(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<StoredDocument<T>>> {
        let url = self.collection_url::<T>();
        let (model_name, task) = filter.normalized();
        let mut query = Vec::new();
        if let Some(model_name) = model_name {
            query.push(("model_name", model_name));
        }
        if let Some(task) = task {
            query.push(("task", task));
        }

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        Ok(ensure_success(&url, response).await?.json().await?)
    }

    pub async fn create<T: RegistryDocument>(&self, doc: &T) -> anyhow::Result<StoredDocument<T>> {
        let url = self.collection_url::<T>();
        let response = self
            .http_client
            .post(&url)
            .json(doc)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        Ok(ensure_success(&url, response).await?.json().await?)
    }

    pub async fn get<T: RegistryDocument>(&self, id: &str) -> anyhow::Result<Option<StoredDocument<T>>> {
        let url = self.item_url::<T>(id);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(ensure_success(&url, response).await?.json().await?))
    }

    pub async fn update<T: RegistryDocument>(&self, id: &str, doc: &T) -> anyhow::Result<StoredDocument<T>> {
        let url = self.item_url::<T>(id);
        let response = self
            .http_client
            .put(&url)
            .json(doc)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        Ok(ensure_success(&url, response).await?.json().await?)
    }

    /// `false` when the document did not exist.
    pub async fn delete<T: RegistryDocument>(&self, id: &str) -> anyhow::Result<bool> {
        let url = self.item_url::<T>(id);
        let response = self
            .http_client
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(&url, response).await?;
        Ok(true)
    }
}

//! Push a service ledger into the registry.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::profiling::LedgerStore;
use crate::registry::{AiService, DocumentFilter};

use super::RegistryClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created(String),
    Updated(String),
}

/// Load the ledger as an [`AiService`] document, optionally overriding its
/// `model_name`.
pub async fn load_service_document(ledger_path: &Path, model_name: Option<&str>) -> anyhow::Result<AiService> {
    let path: PathBuf = ledger_path.to_path_buf();
    let data = tokio::task::spawn_blocking(move || LedgerStore::new(path).load()).await??;

    let mut document = serde_json::to_value(&data)?;
    if let (Some(name), Some(fields)) = (model_name, document.as_object_mut()) {
        fields.insert("model_name".to_string(), name.into());
    }
    serde_json::from_value(document)
        .with_context(|| format!("Ledger {} is not a valid AI service document", ledger_path.display()))
}

/// Create or replace the registry entry for the ledger's model: one
/// existing match is updated, none is created, several is an error.
pub async fn publish_service_data(
    client: &RegistryClient,
    ledger_path: &Path,
    model_name: Option<&str>,
) -> anyhow::Result<PublishOutcome> {
    let service = load_service_document(ledger_path, model_name).await?;
    let filter = DocumentFilter {
        model_name: Some(service.model_name.clone()),
        task: None,
    };

    let existing = client.list::<AiService>(&filter).await?;
    match existing.as_slice() {
        [] => {
            let created = client.create(&service).await?;
            info!("Registered AI service {} as {}", service.model_name, created.id);
            Ok(PublishOutcome::Created(created.id))
        }
        [current] => {
            let updated = client.update(&current.id, &service).await?;
            info!("Updated AI service {} ({})", service.model_name, updated.id);
            Ok(PublishOutcome::Updated(updated.id))
        }
        several => anyhow::bail!(
            "Multiple AI services found for model_name {} ({} matches)",
            service.model_name,
            several.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_ledger(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("service_data.json");
        std::fs::write(
            &path,
            json!({
                "model_name": "dslim/bert-base-NER",
                "task": "token-classification",
                "code": {"readme_content": "# NER"},
                "profiles": []
            })
            .to_string(),
        )
        .unwrap();
        path
    }

    fn stored(id: &str) -> String {
        json!({
            "id": id,
            "model_name": "dslim/bert-base-NER",
            "task": "token-classification",
            "profiles": []
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_publish_creates_when_absent() {
        let dir = TempDir::new().unwrap();
        let path = write_ledger(&dir);
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ai-services/")
            .match_query(mockito::Matcher::UrlEncoded("model_name".into(), "dslim/bert-base-NER".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;
        let create = server
            .mock("POST", "/ai-services/")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(stored("new-id"))
            .create_async()
            .await;

        let client = RegistryClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let outcome = publish_service_data(&client, &path, None).await.unwrap();

        create.assert_async().await;
        assert_eq!(outcome, PublishOutcome::Created("new-id".to_string()));
    }

    #[tokio::test]
    async fn test_publish_updates_single_match() {
        let dir = TempDir::new().unwrap();
        let path = write_ledger(&dir);
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ai-services/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{}]", stored("existing")))
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/ai-service/existing")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(stored("existing"))
            .create_async()
            .await;

        let client = RegistryClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let outcome = publish_service_data(&client, &path, None).await.unwrap();

        update.assert_async().await;
        assert_eq!(outcome, PublishOutcome::Updated("existing".to_string()));
    }

    #[tokio::test]
    async fn test_publish_rejects_ambiguous_match() {
        let dir = TempDir::new().unwrap();
        let path = write_ledger(&dir);
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ai-services/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{}, {}]", stored("a"), stored("b")))
            .create_async()
            .await;

        let client = RegistryClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = publish_service_data(&client, &path, None).await.unwrap_err();
        assert!(err.to_string().contains("Multiple AI services"));
    }

    #[tokio::test]
    async fn test_model_name_override() {
        let dir = TempDir::new().unwrap();
        let path = write_ledger(&dir);
        let service = load_service_document(&path, Some("renamed/model")).await.unwrap();
        assert_eq!(service.model_name, "renamed/model");
        assert_eq!(service.code.readme_content.as_deref(), Some("# NER"));
    }
}

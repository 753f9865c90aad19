//! Registry document types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::profiling::NodeProfile;

/// A document kind stored in its own collection.
pub trait RegistryDocument: Serialize + DeserializeOwned + Validate + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human readable kind used in response messages, e.g. "AI Service".
    const LABEL: &'static str;
    /// Route serving the collection (create, list).
    const COLLECTION_ROUTE: &'static str;
    /// Route prefix of a single document; the id is appended.
    const ITEM_ROUTE: &'static str;

    fn model_name(&self) -> &str;
    fn task(&self) -> &str;
}

/// Source files and documentation bundled with a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeContents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_server_script_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_client_script_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_script_content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Catalog entry for one wrapped model, including its profiling ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AiService {
    #[validate(length(min = 1, message = "model_name must not be empty"))]
    pub model_name: String,
    #[validate(length(min = 1, message = "task must not be empty"))]
    pub task: String,
    #[serde(default)]
    pub model_url: String,
    #[serde(default)]
    pub image_repository_url: String,
    #[serde(default)]
    pub task_detail: String,
    #[serde(default)]
    pub accuracy_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_disk_size_bytes: Option<u64>,
    #[serde(default)]
    pub code: CodeContents,
    #[serde(default)]
    pub profiles: Vec<NodeProfile>,
    /// Keys this registry does not interpret (feedback, tags, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistryDocument for AiService {
    const COLLECTION: &'static str = "ai_services";
    const LABEL: &'static str = "AI Service";
    const COLLECTION_ROUTE: &'static str = "/ai-services/";
    const ITEM_ROUTE: &'static str = "/ai-service/";

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn task(&self) -> &str {
        &self.task
    }
}

/// Container image published for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AiServiceImage {
    #[validate(length(min = 1, message = "model_name must not be empty"))]
    pub model_name: String,
    #[validate(length(min = 1, message = "task must not be empty"))]
    pub task: String,
    #[validate(length(min = 1, message = "docker_image must not be empty"))]
    pub docker_image: String,
}

impl RegistryDocument for AiServiceImage {
    const COLLECTION: &'static str = "ai_service_images";
    const LABEL: &'static str = "AI Service Image";
    const COLLECTION_ROUTE: &'static str = "/ai-service-images/";
    const ITEM_ROUTE: &'static str = "/ai-service-images/";

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn task(&self) -> &str {
        &self.task
    }
}

/// A document as returned by the API: the body plus its string id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

/// Exact-match filters for listing. Empty strings are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    pub model_name: Option<String>,
    pub task: Option<String>,
}

impl DocumentFilter {
    pub fn normalized(&self) -> (Option<&str>, Option<&str>) {
        fn clean(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }
        (clean(&self.model_name), clean(&self.task))
    }
}

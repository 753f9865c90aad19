use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Form field carrying the requested explanation method.
pub const XAI_METHOD_FIELD: &str = "gradcam_method_name";
/// Short alias accepted for [`XAI_METHOD_FIELD`].
pub const XAI_METHOD_ALIAS: &str = "method";

/// One uploaded file from a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Decoded request form handed to a model.
#[derive(Debug, Clone, Default)]
pub struct ModelInput {
    pub files: Vec<UploadedFile>,
    pub fields: BTreeMap<String, String>,
}

impl ModelInput {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn require_field(&self, name: &str) -> anyhow::Result<&str> {
        self.field(name)
            .ok_or_else(|| anyhow::anyhow!("Missing required form field '{}'", name))
    }

    pub fn float_field(&self, name: &str) -> anyhow::Result<Option<f64>> {
        self.field(name)
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|e| anyhow::anyhow!("Form field '{}' is not a number: {}", name, e))
            })
            .transpose()
    }

    /// Accepts a JSON array (`["a","b"]`) or a comma separated list.
    pub fn list_field(&self, name: &str) -> Option<Vec<String>> {
        let raw = self.field(name)?.trim();
        if raw.starts_with('[') {
            if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
                return Some(items);
            }
        }
        Some(
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        )
    }

    /// The requested XAI method, under its full field name or the alias.
    pub fn xai_method(&self) -> Option<&str> {
        [XAI_METHOD_FIELD, XAI_METHOD_ALIAS]
            .into_iter()
            .filter_map(|name| self.field(name))
            .map(str::trim)
            .find(|method| !method.is_empty())
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Total payload size in bytes (files plus field values).
    pub fn input_size(&self) -> usize {
        let files: usize = self.files.iter().map(|f| f.data.len()).sum();
        let fields: usize = self.fields.values().map(String::len).sum();
        files + fields
    }
}

/// Output of an explanation call: the plain prediction plus the
/// explanation itself (e.g. `{"image": ..., "xai_method": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub model_results: Value,
    pub xai_results: Value,
}

/// Static description of a model used to build `/help`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub runtime_name: String,
    pub supports_xai: bool,
}

/// A loaded model that can be invoked synchronously.
///
/// `infer` is blocking work; callers run it on a blocking thread.
pub trait InferenceModel: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, input: &ModelInput) -> anyhow::Result<Value>;

    /// Form fields accepted by `run`, keyed by field name.
    fn input_form_spec(&self) -> Value;

    /// Shape of the JSON returned by `run`.
    fn output_json_spec(&self) -> Value;

    /// Explanation methods this model supports. Empty disables the XAI routes.
    fn xai_methods(&self) -> Vec<String> {
        Vec::new()
    }

    fn explain(&self, _input: &ModelInput, method: &str) -> anyhow::Result<Explanation> {
        Err(anyhow::anyhow!("Model '{}' does not support XAI method '{}'", self.name(), method))
    }

    /// Extra keys the XAI routes add to the output spec.
    fn xai_output_json_spec(&self) -> Value {
        serde_json::json!({
            "xai_results": {
                "image": "XAI image result",
                "xai_method": "XAI method used",
            }
        })
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_name: self.name().to_string(),
            runtime_name: "unknown".to_string(),
            supports_xai: !self.xai_methods().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(fields: &[(&str, &str)]) -> ModelInput {
        ModelInput {
            files: vec![UploadedFile {
                field: "file".to_string(),
                file_name: Some("puppy.png".to_string()),
                content_type: Some("image/png".to_string()),
                data: Bytes::from_static(b"12345"),
            }],
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_list_field_accepts_json_and_csv() {
        let json = input(&[("labels", r#"["cat", "dog"]"#)]);
        assert_eq!(json.list_field("labels").unwrap(), vec!["cat", "dog"]);

        let csv = input(&[("labels", "cat, dog ,")]);
        assert_eq!(csv.list_field("labels").unwrap(), vec!["cat", "dog"]);
        assert!(csv.list_field("missing").is_none());
    }

    #[test]
    fn test_float_field() {
        let form = input(&[("threshold", " 0.25 "), ("bad", "x")]);
        assert_eq!(form.float_field("threshold").unwrap(), Some(0.25));
        assert_eq!(form.float_field("missing").unwrap(), None);
        assert!(form.float_field("bad").is_err());
    }

    #[test]
    fn test_input_size_counts_files_and_fields() {
        let form = input(&[("text", "abc")]);
        assert_eq!(form.input_size(), 8);
        assert!(form.file("file").is_some());
    }

    #[test]
    fn test_xai_method_prefers_full_field_name() {
        assert_eq!(input(&[("gradcam_method_name", "GradCAM")]).xai_method(), Some("GradCAM"));
        assert_eq!(input(&[("method", " LayerCAM ")]).xai_method(), Some("LayerCAM"));
        assert_eq!(
            input(&[("gradcam_method_name", "GradCAM"), ("method", "LayerCAM")]).xai_method(),
            Some("GradCAM")
        );
        assert_eq!(input(&[("gradcam_method_name", " ")]).xai_method(), None);
    }
}

//! Deterministic built-in model: describes its input instead of predicting.
//! Used for smoke tests and for dry runs of the profiling pipeline.

use serde_json::{json, Value};

use super::model_trait::{InferenceModel, ModelInput, ModelMetadata};

pub struct EchoModel {
    name: String,
}

impl EchoModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl InferenceModel for EchoModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, input: &ModelInput) -> anyhow::Result<Value> {
        let files: Vec<Value> = input
            .files
            .iter()
            .map(|f| {
                json!({
                    "field": f.field,
                    "file_name": f.file_name,
                    "content_type": f.content_type,
                    "size": f.data.len(),
                    "blake3": blake3::hash(&f.data).to_hex().to_string(),
                })
            })
            .collect();

        let fields: serde_json::Map<String, Value> = input
            .fields
            .iter()
            .filter(|(k, _)| k.as_str() != "ue_id")
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();

        Ok(json!({
            "files": files,
            "fields": fields,
            "input_size": input.input_size(),
        }))
    }

    fn input_form_spec(&self) -> Value {
        json!({
            "file": {
                "type": "file upload",
                "description": "Any file; size, content type and digest are echoed back.",
                "required": false,
                "example": "puppy.png",
            },
            "<any>": {
                "type": "string",
                "description": "Any additional form field is echoed back.",
                "required": false,
            },
        })
    }

    fn output_json_spec(&self) -> Value {
        json!({
            "ue_id": "unique execution ID",
            "model_results": {
                "files": [{
                    "field": "form field name",
                    "file_name": "uploaded file name",
                    "content_type": "uploaded content type",
                    "size": "size in bytes",
                    "blake3": "hex digest of the file content",
                }],
                "fields": "echoed form fields",
                "input_size": "total input size in bytes",
            },
        })
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_name: self.name.clone(),
            runtime_name: "echo".to_string(),
            supports_xai: false,
        }
    }
}

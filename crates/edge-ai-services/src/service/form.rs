//! Multipart request decoding.

use axum::extract::multipart::{Multipart, MultipartRejection};

use crate::error::ApiError;
use crate::model_runtime::{ModelInput, UploadedFile};

/// Drain a multipart body into a [`ModelInput`]. Parts carrying a file name
/// become files; everything else is read as a UTF-8 field.
pub async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> Result<ModelInput, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut input = ModelInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read file '{}': {}", name, e)))?;
            input.files.push(UploadedFile {
                field: name,
                file_name,
                content_type,
                data,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read field '{}': {}", name, e)))?;
            input.fields.insert(name, value);
        }
    }

    Ok(input)
}

pub fn require_ue_id(input: &ModelInput) -> Result<String, ApiError> {
    input
        .field("ue_id")
        .map(str::trim)
        .filter(|ue_id| !ue_id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("UE_ID is required.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_ue_id() {
        let mut input = ModelInput::default();
        assert!(matches!(require_ue_id(&input), Err(ApiError::BadRequest(msg)) if msg == "UE_ID is required."));

        input.fields.insert("ue_id".to_string(), "  ".to_string());
        assert!(require_ue_id(&input).is_err());

        input.fields.insert("ue_id".to_string(), " 123456 ".to_string());
        assert_eq!(require_ue_id(&input).unwrap(), "123456");
    }
}

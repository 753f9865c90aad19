//! HTTP error types for the model service and the registry.
//!
//! [`ApiError`] renders as `{"error": "<message>"}`. The registry wraps it in
//! [`DetailError`], which keeps the status mapping and renders
//! `{"detail": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Model(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Model(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", e))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl ApiError {
    fn render(self, key: &str) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), json!(self.to_string()));
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.render("error")
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct DetailError(#[from] pub ApiError);

impl From<anyhow::Error> for DetailError {
    fn from(e: anyhow::Error) -> Self {
        DetailError(e.into())
    }
}

impl From<validator::ValidationErrors> for DetailError {
    fn from(e: validator::ValidationErrors) -> Self {
        DetailError(e.into())
    }
}

impl IntoResponse for DetailError {
    fn into_response(self) -> Response {
        self.0.render("detail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_body() {
        let (status, body) = body_of(ApiError::BadRequest("UE_ID is required.".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "UE_ID is required."}));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::Model("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = body_of(anyhow::anyhow!("disk full").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "disk full");
    }

    #[tokio::test]
    async fn test_detail_error_body() {
        let response = DetailError(ApiError::NotFound("AI Service not found".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"detail": "AI Service not found"}));
    }
}

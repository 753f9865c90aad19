//! CRUD handlers, generic over the document kind.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;
use validator::Validate;

use crate::error::{ApiError, DetailError};

use super::schema::{DocumentFilter, RegistryDocument, StoredDocument};
use super::RegistryDatabase;

fn not_found<T: RegistryDocument>() -> DetailError {
    DetailError(ApiError::NotFound(format!("{} not found", T::LABEL)))
}

fn parse_body<T: RegistryDocument>(body: Result<Json<T>, JsonRejection>) -> Result<T, DetailError> {
    let Json(doc) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    doc.validate()?;
    Ok(doc)
}

pub async fn create<T: RegistryDocument>(
    State(db): State<Arc<RegistryDatabase>>,
    body: Result<Json<T>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredDocument<T>>), DetailError> {
    let doc = parse_body(body)?;
    let created = db.store::<T>().create(&doc)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list<T: RegistryDocument>(
    State(db): State<Arc<RegistryDatabase>>,
    Query(filter): Query<DocumentFilter>,
) -> Result<Json<Vec<StoredDocument<T>>>, DetailError> {
    let documents = db.store::<T>().list(&filter)?;
    info!("Returning {} {} documents", documents.len(), T::COLLECTION);
    Ok(Json(documents))
}

pub async fn get_one<T: RegistryDocument>(
    State(db): State<Arc<RegistryDatabase>>,
    Path(id): Path<String>,
) -> Result<Json<StoredDocument<T>>, DetailError> {
    db.store::<T>().get(&id)?.map(Json).ok_or_else(not_found::<T>)
}

pub async fn update<T: RegistryDocument>(
    State(db): State<Arc<RegistryDatabase>>,
    Path(id): Path<String>,
    body: Result<Json<T>, JsonRejection>,
) -> Result<Json<StoredDocument<T>>, DetailError> {
    let doc = parse_body(body)?;
    db.store::<T>().update(&id, &doc)?.map(Json).ok_or_else(not_found::<T>)
}

pub async fn delete<T: RegistryDocument>(
    State(db): State<Arc<RegistryDatabase>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, DetailError> {
    if !db.store::<T>().delete(&id)? {
        return Err(not_found::<T>());
    }
    Ok(Json(json!({ "message": format!("{} deleted successfully", T::LABEL) })))
}

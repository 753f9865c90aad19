//! Collection-scoped CRUD over the `documents` table.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::schema::{DocumentFilter, RegistryDocument, StoredDocument};

pub struct DocumentStore<T> {
    pool: Arc<Pool<SqliteConnectionManager>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RegistryDocument> DocumentStore<T> {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Serialized body without any client-supplied `id`.
    fn encode(doc: &T) -> anyhow::Result<String> {
        let mut body = serde_json::to_value(doc)?;
        if let Value::Object(fields) = &mut body {
            fields.remove("id");
        }
        Ok(serde_json::to_string(&body)?)
    }

    fn decode(id: String, body: &str) -> anyhow::Result<StoredDocument<T>> {
        let data = serde_json::from_str(body)
            .map_err(|e| anyhow::anyhow!("Corrupt {} document {}: {}", T::COLLECTION, id, e))?;
        Ok(StoredDocument { id, data })
    }

    pub fn create(&self, doc: &T) -> anyhow::Result<StoredDocument<T>> {
        let conn = self.get_conn()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let body = Self::encode(doc)?;

        conn.execute(
            "INSERT INTO documents (id, collection, model_name, task, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![&id, T::COLLECTION, doc.model_name(), doc.task(), &body, &now],
        )?;

        info!("Created {} {} ({})", T::LABEL, id, doc.model_name());
        Self::decode(id, &body)
    }

    pub fn list(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<StoredDocument<T>>> {
        let conn = self.get_conn()?;
        let (model_name, task) = filter.normalized();
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents
             WHERE collection = ?1
               AND (?2 IS NULL OR model_name = ?2)
               AND (?3 IS NULL OR task = ?3)
             ORDER BY created_at, rowid",
        )?;

        let mut rows = stmt.query(params![T::COLLECTION, model_name, task])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let body: String = row.get(1)?;
            documents.push(Self::decode(id, &body)?);
        }

        debug!("Listed {} {} documents", documents.len(), T::COLLECTION);
        Ok(documents)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<StoredDocument<T>>> {
        let conn = self.get_conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![T::COLLECTION, id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| Self::decode(id.to_string(), &body)).transpose()
    }

    /// Replace the body of an existing document. `None` if the id is unknown.
    pub fn update(&self, id: &str, doc: &T) -> anyhow::Result<Option<StoredDocument<T>>> {
        let conn = self.get_conn()?;
        let body = Self::encode(doc)?;
        let updated = conn.execute(
            "UPDATE documents SET model_name = ?3, task = ?4, body = ?5, updated_at = ?6
             WHERE collection = ?1 AND id = ?2",
            params![T::COLLECTION, id, doc.model_name(), doc.task(), &body, Utc::now().to_rfc3339()],
        )?;

        if updated == 0 {
            return Ok(None);
        }
        info!("Updated {} {}", T::LABEL, id);
        Self::decode(id.to_string(), &body).map(Some)
    }

    /// `false` if nothing was deleted.
    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![T::COLLECTION, id],
        )?;
        if deleted > 0 {
            info!("Deleted {} {}", T::LABEL, id);
        }
        Ok(deleted > 0)
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [T::COLLECTION],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::schema::{AiService, AiServiceImage};
    use crate::registry::RegistryDatabase;

    fn image(model_name: &str, task: &str) -> AiServiceImage {
        AiServiceImage {
            model_name: model_name.to_string(),
            task: task.to_string(),
            docker_image: format!("registry.local/{}:latest", model_name.replace('/', "-")),
        }
    }

    #[test]
    fn test_create_then_get() {
        let db = RegistryDatabase::new_in_memory().unwrap();
        let store = db.images();

        let created = store.create(&image("facebook/detr-resnet-50", "object-detection")).unwrap();
        assert!(!created.id.is_empty());

        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_filters() {
        let db = RegistryDatabase::new_in_memory().unwrap();
        let store = db.images();
        store.create(&image("a", "ner")).unwrap();
        store.create(&image("b", "ner")).unwrap();
        store.create(&image("c", "image-classification")).unwrap();

        let all = store.list(&DocumentFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].data.model_name, "a");

        let ner = store
            .list(&DocumentFilter { model_name: None, task: Some("ner".to_string()) })
            .unwrap();
        assert_eq!(ner.len(), 2);

        let b = store
            .list(&DocumentFilter { model_name: Some("b".to_string()), task: Some("ner".to_string()) })
            .unwrap();
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_collections_are_isolated() {
        let db = RegistryDatabase::new_in_memory().unwrap();
        db.images().create(&image("a", "ner")).unwrap();
        assert_eq!(db.services().count().unwrap(), 0);
        assert_eq!(db.images().count().unwrap(), 1);
    }

    #[test]
    fn test_update_and_delete() {
        let db = RegistryDatabase::new_in_memory().unwrap();
        let store = db.services();
        let service: AiService = serde_json::from_value(serde_json::json!({
            "model_name": "dslim/bert-base-NER",
            "task": "token-classification",
            "id": "client-supplied",
        }))
        .unwrap();

        let created = store.create(&service).unwrap();
        assert!(!created.data.extra.contains_key("id"));

        let mut changed = created.data.clone();
        changed.task = "ner".to_string();
        let updated = store.update(&created.id, &changed).unwrap().unwrap();
        assert_eq!(updated.data.task, "ner");
        assert!(store.update("missing", &changed).unwrap().is_none());

        assert!(store.delete(&created.id).unwrap());
        assert!(!store.delete(&created.id).unwrap());
        assert!(store.get(&created.id).unwrap().is_none());
    }
}

//! JSON document storage for the resource collaborators.
//!
//! Patient, resident, meal, message and the other care-record domains are stored as
//! opaque JSON documents grouped by collection name.  The backbone does not interpret
//! their contents.

use std::collections::BTreeMap;
use std::sync::Mutex;

use axum::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StoreError;

/// A stored JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier, unique within the store.
    pub id: i64,
    /// Collection the document belongs to.
    pub collection: String,
    /// Document body.
    pub body: Value,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
    /// When the document was last replaced.
    pub updated_at: DateTime<Utc>,
}

/// Persistence interface for collection-scoped JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lists a collection in creation order.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Creates a document and returns it with its assigned identifier.
    async fn create(&self, collection: &str, body: &Value) -> Result<Document, StoreError>;

    /// Fetches one document.
    async fn get(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError>;

    /// Replaces a document body; `Ok(None)` when the document does not exist.
    async fn replace(
        &self,
        collection: &str,
        id: i64,
        body: &Value,
    ) -> Result<Option<Document>, StoreError>;

    /// Deletes a document; `Ok(false)` when it did not exist.
    async fn delete(&self, collection: &str, id: i64) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct Documents {
    next_id: i64,
    rows: BTreeMap<i64, Document>,
}

/// Thread-safe in-memory document storage.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: Mutex<Documents>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Documents>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("document store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .lock()?
            .rows
            .values()
            .filter(|d| d.collection == collection)
            .cloned()
            .collect())
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<Document, StoreError> {
        let mut docs = self.lock()?;
        docs.next_id += 1;
        let now = Utc::now();
        let doc = Document {
            id: docs.next_id,
            collection: collection.to_string(),
            body: body.clone(),
            created_at: now,
            updated_at: now,
        };
        docs.rows.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        Ok(self
            .lock()?
            .rows
            .get(&id)
            .filter(|d| d.collection == collection)
            .cloned())
    }

    async fn replace(
        &self,
        collection: &str,
        id: i64,
        body: &Value,
    ) -> Result<Option<Document>, StoreError> {
        let mut docs = self.lock()?;
        match docs.rows.get_mut(&id) {
            Some(doc) if doc.collection == collection => {
                doc.body = body.clone();
                doc.updated_at = Utc::now();
                Ok(Some(doc.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<bool, StoreError> {
        let mut docs = self.lock()?;
        let owned = docs
            .rows
            .get(&id)
            .is_some_and(|d| d.collection == collection);
        if owned {
            docs.rows.remove(&id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = InMemoryDocumentStore::new();
        let meal = store.create("meals", &json!({"dish": "congee"})).await.unwrap();
        store.create("patients", &json!({"name": "A"})).await.unwrap();

        assert_eq!(store.list("meals").await.unwrap().len(), 1);
        assert_eq!(store.get("patients", meal.id).await.unwrap(), None);
        assert!(!store.delete("patients", meal.id).await.unwrap());
        assert!(store.get("meals", meal.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn replace_updates_body() {
        let store = InMemoryDocumentStore::new();
        let doc = store.create("messages", &json!({"text": "hi"})).await.unwrap();
        let replaced = store
            .replace("messages", doc.id, &json!({"text": "bye"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced.body, json!({"text": "bye"}));
        assert_eq!(replaced.created_at, doc.created_at);
        assert!(replaced.updated_at >= doc.updated_at);
        assert_eq!(
            store.replace("messages", 999, &json!({})).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let store = InMemoryDocumentStore::new();
        let doc = store.create("activities", &json!({"kind": "walk"})).await.unwrap();
        assert!(store.delete("activities", doc.id).await.unwrap());
        assert!(!store.delete("activities", doc.id).await.unwrap());
        assert!(store.list("activities").await.unwrap().is_empty());
    }
}

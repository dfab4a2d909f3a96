//! Document operations for PostgreSQL database.
//!
//! Bodies are stored as `jsonb`; `updated_at` is bumped on every replace.

use axum::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;

use crate::StoreError;
use crate::document::{Document, DocumentStore};

type DocumentRow = (i64, String, Json<Value>, DateTime<Utc>, DateTime<Utc>);

fn from_row((id, collection, Json(body), created_at, updated_at): DocumentRow) -> Document {
    Document {
        id,
        collection,
        body,
        created_at,
        updated_at,
    }
}

/// [`DocumentStore`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Wraps `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, collection, body, created_at, updated_at
            FROM documents
            WHERE collection = $1
            ORDER BY id
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (collection, body)
            VALUES ($1, $2)
            RETURNING id, collection, body, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(Json(body))
        .fetch_one(&self.pool)
        .await?;
        Ok(from_row(row))
    }

    async fn get(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, collection, body, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    async fn replace(
        &self,
        collection: &str,
        id: i64,
        body: &Value,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            UPDATE documents
            SET body = $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            RETURNING id, collection, body, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(body))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::tests::setup_test_db;
    use serde_json::json;

    #[tokio::test]
    async fn document_lifecycle() {
        let Some(pool) = setup_test_db().await else {
            return;
        };
        let store = PgDocumentStore::new(pool);
        let doc = store
            .create("meals", &json!({"dish": "porridge"}))
            .await
            .unwrap();
        assert_eq!(store.get("meals", doc.id).await.unwrap(), Some(doc.clone()));
        assert_eq!(store.get("patients", doc.id).await.unwrap(), None);

        let replaced = store
            .replace("meals", doc.id, &json!({"dish": "rice"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced.body, json!({"dish": "rice"}));

        assert!(store.delete("meals", doc.id).await.unwrap());
        assert!(!store.delete("meals", doc.id).await.unwrap());
    }
}

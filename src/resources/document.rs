//! Collection-scoped JSON documents.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::{Value, json};

use crate::document::{Document, DocumentStore};
use crate::fault::{ApiError, JsonBody, PathParam};
use crate::router::{Resource, Routes};

/// Serves one document collection at `/` and `/:id`.
#[derive(Clone)]
pub struct DocumentResource {
    collection: Arc<str>,
    store: Arc<dyn DocumentStore>,
}

impl DocumentResource {
    /// Serves `collection` from `store`.
    pub fn new(collection: &str, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            collection: Arc::from(collection),
            store,
        }
    }

    fn missing(&self) -> Response {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "Document not found"})),
        )
            .into_response()
    }
}

impl Resource for DocumentResource {
    fn routes(&self) -> Routes {
        Routes::new()
            .route("/", get(list_documents).post(create_document))
            .route(
                "/:id",
                get(get_document)
                    .put(replace_document)
                    .delete(delete_document),
            )
            .with_state(self.clone())
    }
}

async fn list_documents(
    State(resource): State<DocumentResource>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(resource.store.list(&resource.collection).await?))
}

async fn create_document(
    State(resource): State<DocumentResource>,
    JsonBody(body): JsonBody<Value>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let document = resource.store.create(&resource.collection, &body).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn get_document(
    State(resource): State<DocumentResource>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    match resource.store.get(&resource.collection, id).await? {
        Some(document) => Ok(Json(document).into_response()),
        None => Ok(resource.missing()),
    }
}

async fn replace_document(
    State(resource): State<DocumentResource>,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    match resource.store.replace(&resource.collection, id, &body).await? {
        Some(document) => Ok(Json(document).into_response()),
        None => Ok(resource.missing()),
    }
}

async fn delete_document(
    State(resource): State<DocumentResource>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    if resource.store.delete(&resource.collection, id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(resource.missing())
    }
}

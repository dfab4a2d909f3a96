//! Read-only account listing.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::json;

use crate::account::{AccountProfile, AccountStore};
use crate::fault::{ApiError, PathParam};
use crate::router::{Resource, Routes};

/// Serves `/users` and `/users/:id` without password hashes.
#[derive(Clone)]
pub struct UserResource {
    accounts: Arc<dyn AccountStore>,
}

impl UserResource {
    /// Serves accounts from `accounts`.
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }
}

impl Resource for UserResource {
    fn routes(&self) -> Routes {
        Routes::new()
            .route("/users", get(list_users))
            .route("/users/:id", get(get_user))
            .with_state(self.clone())
    }
}

async fn list_users(
    State(resource): State<UserResource>,
) -> Result<Json<Vec<AccountProfile>>, ApiError> {
    let accounts = resource.accounts.list().await?;
    Ok(Json(accounts.iter().map(|a| a.profile()).collect()))
}

async fn get_user(
    State(resource): State<UserResource>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    match resource.accounts.get(id).await? {
        Some(account) => Ok(Json(account.profile()).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "User not found"})),
        )
            .into_response()),
    }
}

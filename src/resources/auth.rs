//! Password sign-in.
//!
//! Verifies an email/password pair against the stored bcrypt hash and answers with the
//! account profile.  Issuing session tokens is left to a dedicated service.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::account::{AccountProfile, AccountStore};
use crate::fault::{ApiError, JsonBody};
use crate::router::{Resource, Routes};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Body of `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

/// Successful sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Always `"success"`.
    pub status: String,
    /// The signed-in account.
    pub user: AccountProfile,
}

/// Serves `POST /login`.
#[derive(Clone)]
pub struct AuthResource {
    accounts: Arc<dyn AccountStore>,
}

impl AuthResource {
    /// Authenticates against `accounts`.
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }
}

impl Resource for AuthResource {
    fn routes(&self) -> Routes {
        Routes::new()
            .route("/login", post(login))
            .with_state(self.clone())
    }
}

async fn login(
    State(resource): State<AuthResource>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Response, ApiError> {
    let Some(account) = resource.accounts.find_by_email(&request.email).await? else {
        return Ok(rejected());
    };
    let hash = account.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(&request.password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match verified {
        Ok(true) => Ok(Json(LoginResponse {
            status: "success".to_string(),
            user: account.profile(),
        })
        .into_response()),
        Ok(false) => Ok(rejected()),
        Err(err) => {
            tracing::warn!(email = %account.email, error = %err, "stored password hash is unusable");
            Ok(rejected())
        }
    }
}

fn rejected() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"status": "error", "message": INVALID_CREDENTIALS})),
    )
        .into_response()
}

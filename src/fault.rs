//! # Fault Boundary
//!
//! Two terminal stages turn everything the resource collaborators do not answer into
//! uniform JSON:
//!
//! - the **error stage** catches [`ApiError`]s returned by handlers and panics raised
//!   inside them, logs the full detail, and answers `500` with an [`ErrorEnvelope`];
//! - the **not-found stage** answers `404` for requests no mount claimed.
//!
//! ```text
//! request ─▶ error stage ─▶ panic catcher ─▶ router ─┬─▶ collaborator
//!                ▲                                   └─▶ not-found stage
//!                └──── responses tagged with a Fault are rewritten to 500
//! ```
//!
//! The error envelope only carries diagnostic detail in [`RuntimeMode::Development`];
//! in production its `error` field is an empty object.
//!
//! Requests the collaborators cannot read (a malformed or oversized JSON body, a wrong
//! content type, a path parameter of the wrong shape) go through the same error stage:
//! handlers take [`JsonBody`] and [`PathParam`] instead of axum's extractors, and those
//! reject with an [`ApiError`].

use std::any::Any;
use std::fmt::{Display, Formatter, Result as FmtResult};

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::StoreError;
use crate::config::RuntimeMode;

/// Message of every 404 envelope.
pub const NOT_FOUND_MESSAGE: &str = "Route not found";

/// Message of every 500 envelope.
pub const INTERNAL_ERROR_MESSAGE: &str = "Something went wrong!";

/////////////////////////////////////////// ErrorEnvelope //////////////////////////////////////////

/// The uniform error body: `{status, message, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always `"error"`.
    pub status: String,
    /// Human-readable summary.
    pub message: String,
    /// Diagnostic detail, or `{}` when detail is suppressed.  Absent on 404s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ErrorEnvelope {
    /// The 404 envelope.
    pub fn not_found() -> Self {
        Self {
            status: "error".to_string(),
            message: NOT_FOUND_MESSAGE.to_string(),
            error: None,
        }
    }

    /// The 500 envelope; `detail` is included only when `mode` allows it.
    pub fn internal(mode: RuntimeMode, detail: &str) -> Self {
        let error = if mode.exposes_error_detail() {
            Value::String(detail.to_string())
        } else {
            json!({})
        };
        Self {
            status: "error".to_string(),
            message: INTERNAL_ERROR_MESSAGE.to_string(),
            error: Some(error),
        }
    }
}

////////////////////////////////////////////// ApiError ////////////////////////////////////////////

/// An error raised by a request handler.
///
/// Converting it into a response yields a bare `500` tagged with a [`Fault`]; the error
/// stage fills in the envelope.
#[derive(Debug)]
pub enum ApiError {
    /// A store operation failed.
    Store(StoreError),
    /// The request could not be read: its body, content type or path parameters.
    Rejected(String),
    /// Any other unexpected failure.
    Internal(String),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ApiError::Store(err) => write!(f, "{}", err),
            ApiError::Rejected(msg) => write!(f, "{}", msg),
            ApiError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected(rejection.body_text())
    }
}

/// Marker placed in response extensions by failing handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// What kind of failure, e.g. `"Error"` or `"Panic"`.
    pub kind: &'static str,
    /// Full diagnostic detail.
    pub detail: String,
}

impl Fault {
    /// A bare 500 response carrying this fault.
    pub fn respond(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = match self {
            ApiError::Rejected(_) => "Rejection",
            ApiError::Store(_) | ApiError::Internal(_) => "Error",
        };
        Fault {
            kind,
            detail: self.to_string(),
        }
        .respond()
    }
}

//////////////////////////////////////////// Extractors ////////////////////////////////////////////

/// A JSON request body.  Same as [`Json`], but it rejects with an [`ApiError`].
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(JsonBody(value))
    }
}

/// Path parameters.  Same as [`Path`], but it rejects with an [`ApiError`].
#[derive(Debug, Clone)]
pub struct PathParam<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for PathParam<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(PathParam(value))
    }
}

////////////////////////////////////////////// Stages //////////////////////////////////////////////

/// The not-found stage; installed as the router fallback.
pub async fn not_found() -> (StatusCode, Json<ErrorEnvelope>) {
    (StatusCode::NOT_FOUND, Json(ErrorEnvelope::not_found()))
}

/// The error stage.  Responses tagged with a [`Fault`] are logged and rewritten into the
/// 500 envelope; everything else passes through untouched.
pub async fn error_stage(
    State(mode): State<RuntimeMode>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    let Some(fault) = response.extensions().get::<Fault>().cloned() else {
        return response;
    };
    tracing::error!(
        %method,
        %uri,
        kind = fault.kind,
        detail = %fault.detail,
        "request failed"
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorEnvelope::internal(mode, &fault.detail)),
    )
        .into_response()
}

/// Converts a panic caught inside a handler into a fault-tagged response.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    };
    Fault {
        kind: "Panic",
        detail,
    }
    .respond()
}

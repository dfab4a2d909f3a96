//! Resource collaborators mounted by the production route table.
//!
//! Each collaborator owns the routes below its prefix.  The backbone only decides where
//! they are mounted; everything a collaborator answers is its own business, except that
//! failures flow into the fault boundary as [`crate::ApiError`]s.

use std::sync::Arc;

use crate::account::AccountStore;
use crate::document::DocumentStore;
use crate::router::RouteTable;

mod auth;
mod document;
mod user;

pub use auth::{AuthResource, LoginRequest, LoginResponse};
pub use document::DocumentResource;
pub use user::UserResource;

/// `(prefix, advertised key, collection)` of every document-backed mount, in table order.
pub const DOCUMENT_MOUNTS: &[(&str, &str, &str)] = &[
    ("/api/v1/patient", "patients", "patients"),
    ("/api/v1/dashboard", "dashboard", "dashboard"),
    ("/api/v1/resident", "residents", "residents"),
    ("/api/v1/health-progress", "healthProgress", "health_progress"),
    ("/api/v1/activities", "activities", "activities"),
    ("/api/v1/meal", "meal", "meals"),
];

impl RouteTable {
    /// The production table.
    ///
    /// The legacy `/api/v1` mount serves the user routes at `/api/v1/users` and is not
    /// advertised; its routes are named so that it never shadows a longer prefix.
    pub fn standard(accounts: Arc<dyn AccountStore>, documents: Arc<dyn DocumentStore>) -> Self {
        let users = UserResource::new(accounts.clone());
        let mut table = RouteTable::new().mount_unlisted("/api/v1", &users);
        for (prefix, key, collection) in DOCUMENT_MOUNTS {
            let resource = DocumentResource::new(*collection, documents.clone());
            table = table.mount(*prefix, *key, &resource);
        }
        table
            .mount("/api/v1/user", "users", &users)
            .mount(
                "/api/v1/messages",
                "messages",
                &DocumentResource::new("messages", documents),
            )
            .mount("/api/v1/auth", "auth", &AuthResource::new(accounts))
    }
}

//! PostgreSQL storage for lifeec.
//!
//! This module provides the PostgreSQL implementations of the store traits, organized by
//! data type, and the embedded schema migrations.

use sqlx::migrate::Migrator;

/// Account operations.
pub mod account;

/// Collection-scoped document operations.
pub mod document;

/// Schema migrations embedded from the `migrations/` directory at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

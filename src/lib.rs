//! # LIFEEC: Care-Facility API Backbone
//!
//! This crate is the backbone of the LIFEEC care-facility service.  It does not implement
//! the care-record domains themselves; it owns everything around them:
//!
//! - **Connection Management**: a single datastore handle per process, opened before the
//!   listener binds, watched by a periodic liveness probe, and closed exactly once on
//!   shutdown ([`ConnectionManager`])
//! - **Seeding**: a destructive, operator-invoked reset that guarantees exactly one Owner
//!   and one Admin account exist, with bcrypt-hashed credentials ([`seed`])
//! - **Router Composition**: an ordered [`RouteTable`] of prefix → collaborator mounts,
//!   composed into one axum [`axum::Router`] together with a self-description at `GET /`
//!   derived from the same table ([`router`])
//! - **Fault Boundary**: uniform JSON envelopes for unmatched routes (404) and for failing
//!   or panicking handlers (500), plus a guard that turns failed background tasks into a
//!   fatal exit ([`fault`], [`guard`])
//! - **Startup Orchestration**: configuration → connect → bind → serve → close, with the
//!   process exit code as the single outcome ([`server`])
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Startup Orchestrator (server)                             │
//! ├───────────────────────────────────────────────────────────┤
//! │ Router Composer + Fault Boundary (router, fault)          │
//! ├──────────────────────────────┬────────────────────────────┤
//! │ Resource collaborators       │ Seeder (seed)              │
//! │ (resources)                  │                            │
//! ├──────────────────────────────┴────────────────────────────┤
//! │ Stores (AccountStore, DocumentStore; sql for PostgreSQL)  │
//! ├───────────────────────────────────────────────────────────┤
//! │ Connection Manager (connection)                           │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! Composing a route table and serving it in memory:
//!
//! ```rust
//! # use std::sync::Arc;
//! # use lifeec::{Config, InMemoryAccountStore, InMemoryDocumentStore, RouteTable, compose};
//! let table = RouteTable::standard(
//!     Arc::new(InMemoryAccountStore::new()),
//!     Arc::new(InMemoryDocumentStore::new()),
//! );
//! assert!(table.shadowing().is_empty());
//!
//! let endpoints = table.endpoints();
//! assert_eq!(endpoints[0], ("patients".to_string(), "/api/v1/patient".to_string()));
//!
//! let app = compose(table, &Config::default()).unwrap();
//! # let _ = app;
//! ```

#![deny(missing_docs)]

mod errors;

/// Accounts and account storage.
///
/// This module defines the account record, its role tag and the client-safe profile
/// view, together with the `AccountStore` trait and an in-memory implementation used by
/// tests and demos.
pub mod account;

/// Command-line interface utilities for logging setup and program termination.
///
/// This module provides the tracing subscriber setup and the exit helpers shared by the
/// lifeec binaries.
pub mod cli_utils;

/// Environment-driven configuration.
///
/// This module resolves the listener address, runtime mode, CORS allow-list, probe
/// interval and seeding options from the environment, with defaults for everything but
/// the datastore URI.
pub mod config;

/// Datastore connection lifecycle.
///
/// This module owns the single datastore handle of a process: it opens it once, probes
/// it periodically, announces state changes to subscribers and closes it exactly once.
pub mod connection;

/// Collection-scoped JSON document storage for the care-record resources.
pub mod document;

/// Uniform JSON answers for unmatched routes and failed requests.
///
/// This module holds the 404 fallback, the error stage that rewrites failed and
/// panicking handlers into the 500 envelope, and the extractors that route unreadable
/// requests through the same stage.
pub mod fault;

/// Background task supervision.
///
/// Tasks spawned through a guard report their failures and panics as escapes, which the
/// server treats as fatal.
pub mod guard;

/// Resource collaborators mounted by the production route table.
pub mod resources;

/// Route table and router composition.
///
/// This module provides the ordered prefix table, its shadowing check, the self-describing
/// root document and `compose`, which turns a table into one axum router with the fault
/// stages and CORS applied.
pub mod router;

/// Privileged account seeding.
///
/// This module resets the account store to the fixed Owner and Admin seed set with
/// freshly salted bcrypt hashes.
pub mod seed;

/// Startup orchestration.
///
/// This module sequences configuration, connection, wiring, binding and serving, and
/// maps every way the service can end to a process exit status.
pub mod server;

/// PostgreSQL storage and embedded migrations.
pub mod sql;

/// Test doubles for the datastore driver.
pub mod testing;

pub use account::{Account, AccountProfile, AccountStore, InMemoryAccountStore, NewAccount, Role};
pub use config::{Config, ConfigError, RuntimeMode};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, Driver, PgDriver};
pub use document::{Document, DocumentStore, InMemoryDocumentStore};
pub use errors::{ConnectionError, StoreError};
pub use fault::{ApiError, ErrorEnvelope, JsonBody, PathParam};
pub use guard::{Escape, EscapeKind, Guard};
pub use router::{Resource, RootDocument, RouteTable, RouteTableError, Routes, compose};
pub use seed::{
    SeedAccount, SeedError, SeedOutcome, SeedReport, default_seed_accounts,
    reseed_privileged_accounts, seed_privileged_accounts,
};
pub use server::{Running, Services, Shutdown, ShutdownTrigger, Started, StartupError, start};

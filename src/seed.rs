//! # Privileged Account Seeding
//!
//! Reseeding guarantees that exactly the configured privileged accounts exist.  It is
//! destructive: every existing account is deleted and the seed set takes their place.  It
//! therefore never runs as part of an ordinary boot; operators invoke it through the
//! `lifeec-seed` binary, or opt in with `SEED_ON_BOOT=true`.
//!
//! ## Procedure
//!
//! 1. Draw one random salt for the run and bcrypt-hash every seed password with it.
//! 2. Delete every account and insert the hashed accounts through
//!    [`AccountStore::replace_all`], which either does both or neither.  A failed insert
//!    never leaves the service without its Owner and Admin.
//!
//! Because the salt is fresh per run, two runs store different hashes for the same
//! password, yet the plaintext verifies against either.

use serde::{Deserialize, Serialize};

use crate::StoreError;
use crate::account::{AccountStore, NewAccount, Role};

/// bcrypt cost factor used unless configured otherwise.
pub const DEFAULT_COST: u32 = 10;

/// Lowest cost bcrypt accepts.
pub const MIN_COST: u32 = 4;

/// Highest cost bcrypt accepts.
pub const MAX_COST: u32 = 31;

/// A privileged identity the seeder guarantees exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAccount {
    /// Display name.
    pub name: String,
    /// Unique email.
    pub email: String,
    /// Plaintext password; hashed before it reaches the store.
    pub password: String,
    /// Role tag.
    pub role: Role,
}

/// The fixed seed set: one Owner and one Admin sharing `password`.
pub fn default_seed_accounts(password: &str) -> Vec<SeedAccount> {
    vec![
        SeedAccount {
            name: "Owner User".to_string(),
            email: "owner@example.com".to_string(),
            password: password.to_string(),
            role: Role::Owner,
        },
        SeedAccount {
            name: "Admin User".to_string(),
            email: "admin@example.com".to_string(),
            password: password.to_string(),
            role: Role::Admin,
        },
    ]
}

/// What a successful reseed did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    /// Accounts deleted by the reset step.
    pub removed: u64,
    /// Accounts inserted.
    pub inserted: usize,
}

/// Result of the best-effort wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The seed set is in place.
    Seeded(SeedReport),
    /// Seeding failed; the failure was logged.
    Failed,
}

/// Why a reseed failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    /// Two seed entries share an email; nothing was deleted.
    DuplicateEmail(String),
    /// The cost factor is outside bcrypt's range; nothing was deleted.
    InvalidCost(u32),
    /// Hashing a seed password failed; nothing was deleted.
    Hash(String),
    /// Replacing the accounts failed; the previous accounts are still in place.
    Replace(StoreError),
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateEmail(email) => write!(f, "seed set repeats email {}", email),
            Self::InvalidCost(cost) => write!(
                f,
                "bcrypt cost {} outside {}..={}",
                cost, MIN_COST, MAX_COST
            ),
            Self::Hash(msg) => write!(f, "failed to hash seed password: {}", msg),
            Self::Replace(err) => write!(f, "failed to replace accounts: {}", err),
        }
    }
}

impl std::error::Error for SeedError {}

/// Replaces every account with `seeds`, hashed with a fresh salt.
///
/// The seed set is checked for repeated emails and the cost for range, and every password
/// is hashed, before anything is deleted.
pub async fn reseed_privileged_accounts(
    store: &dyn AccountStore,
    seeds: &[SeedAccount],
    cost: u32,
) -> Result<SeedReport, SeedError> {
    if !(MIN_COST..=MAX_COST).contains(&cost) {
        return Err(SeedError::InvalidCost(cost));
    }
    for (idx, seed) in seeds.iter().enumerate() {
        if seeds[..idx].iter().any(|s| s.email == seed.email) {
            return Err(SeedError::DuplicateEmail(seed.email.clone()));
        }
    }

    let accounts = hash_seed_accounts(seeds.to_vec(), cost).await?;
    let removed = store
        .replace_all(&accounts)
        .await
        .map_err(SeedError::Replace)?;

    Ok(SeedReport {
        removed,
        inserted: accounts.len(),
    })
}

/// Runs [`reseed_privileged_accounts`] and contains any failure.
///
/// Failures are logged and reported as [`SeedOutcome::Failed`]; they never propagate to
/// the caller.
pub async fn seed_privileged_accounts(
    store: &dyn AccountStore,
    seeds: &[SeedAccount],
    cost: u32,
) -> SeedOutcome {
    match reseed_privileged_accounts(store, seeds, cost).await {
        Ok(report) => {
            tracing::info!(
                removed = report.removed,
                inserted = report.inserted,
                "users seeded successfully"
            );
            SeedOutcome::Seeded(report)
        }
        Err(err) => {
            tracing::error!(error = %err, "error seeding users");
            SeedOutcome::Failed
        }
    }
}

async fn hash_seed_accounts(
    seeds: Vec<SeedAccount>,
    cost: u32,
) -> Result<Vec<NewAccount>, SeedError> {
    // bcrypt is CPU bound
    tokio::task::spawn_blocking(move || {
        let salt: [u8; 16] = rand::random();
        seeds
            .into_iter()
            .map(|seed| {
                let parts = bcrypt::hash_with_salt(&seed.password, cost, salt)
                    .map_err(|e| SeedError::Hash(e.to_string()))?;
                Ok(NewAccount {
                    name: seed.name,
                    email: seed.email,
                    password_hash: parts.format_for_version(bcrypt::Version::TwoB),
                    role: seed.role,
                })
            })
            .collect::<Result<Vec<_>, SeedError>>()
    })
    .await
    .map_err(|e| SeedError::Hash(e.to_string()))?
}

//! # Accounts
//!
//! Accounts are the identities that can sign in to the care-facility API.  Each account
//! has a display name, an email that is unique across the collection, a bcrypt password
//! hash, and a role drawn from a closed set.
//!
//! Storage goes through the [`AccountStore`] trait so that the seeder and the user/auth
//! collaborators work the same against PostgreSQL ([`crate::sql::account::PgAccountStore`])
//! and against [`InMemoryAccountStore`].

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Mutex;

use axum::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/////////////////////////////////////////////// Role ///////////////////////////////////////////////

/// The closed set of account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Facility owner; highest privilege.
    Owner,
    /// Facility administrator.
    Admin,
    /// Nursing staff.
    Nurse,
    /// Meal planning staff.
    Nutritionist,
    /// A resident's relative.
    Relative,
}

impl Role {
    /// Every role, in privilege order.
    pub const ALL: [Role; 5] = [
        Role::Owner,
        Role::Admin,
        Role::Nurse,
        Role::Nutritionist,
        Role::Relative,
    ];

    /// The tag stored in the datastore.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Admin => "Admin",
            Role::Nurse => "Nurse",
            Role::Nutritionist => "Nutritionist",
            Role::Relative => "Relative",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown role tag {:?}", s)))
    }
}

///////////////////////////////////////////// Accounts /////////////////////////////////////////////

/// An account ready to be inserted; the password is already hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Display name.
    pub name: String,
    /// Unique email.
    pub email: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// Role tag.
    pub role: Role,
}

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Store-assigned identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Unique email.
    pub email: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// Role tag.
    pub role: Role,
    /// When the account was inserted.
    pub created_at: DateTime<Utc>,
}

/// The public view of an account; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    /// Store-assigned identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Unique email.
    pub email: String,
    /// Role tag.
    pub role: Role,
}

impl Account {
    /// Strips credential material for presentation.
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/////////////////////////////////////////// AccountStore ///////////////////////////////////////////

/// Persistence interface for accounts.
///
/// Implementations must reject an insert whose email collides with an existing account
/// (or with another account in the same batch) with [`StoreError::AlreadyExists`], and
/// must apply a batch insert atomically.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Irreversibly removes every account, returning how many were removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;

    /// Inserts every account in `accounts` or none of them.
    async fn insert_many(&self, accounts: &[NewAccount]) -> Result<(), StoreError>;

    /// Replaces every account with `accounts` in one atomic step, returning how many were
    /// removed.  On failure the previous accounts are left untouched.
    async fn replace_all(&self, accounts: &[NewAccount]) -> Result<u64, StoreError>;

    /// Lists every account in insertion order.
    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Fetches one account by identifier.
    async fn get(&self, id: i64) -> Result<Option<Account>, StoreError>;

    /// Fetches one account by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
}

/////////////////////////////////////// InMemoryAccountStore ///////////////////////////////////////

#[derive(Debug, Default)]
struct Accounts {
    next_id: i64,
    rows: Vec<Account>,
}

impl Accounts {
    fn check(&self, batch: &[NewAccount]) -> Result<(), StoreError> {
        for (idx, candidate) in batch.iter().enumerate() {
            let existing = self.rows.iter().any(|a| a.email == candidate.email);
            let in_batch = batch[..idx].iter().any(|a| a.email == candidate.email);
            if existing || in_batch {
                return Err(StoreError::AlreadyExists(candidate.email.clone()));
            }
        }
        Ok(())
    }

    fn append(&mut self, batch: &[NewAccount]) {
        let now = Utc::now();
        for candidate in batch {
            self.next_id += 1;
            self.rows.push(Account {
                id: self.next_id,
                name: candidate.name.clone(),
                email: candidate.email.clone(),
                password_hash: candidate.password_hash.clone(),
                role: candidate.role,
                created_at: now,
            });
        }
    }
}

/// Thread-safe in-memory account storage using `Mutex<Vec>`.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    inner: Mutex<Accounts>,
}

impl InMemoryAccountStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Accounts>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("account store lock poisoned".to_string()))
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut accounts = self.lock()?;
        let removed = accounts.rows.len() as u64;
        accounts.rows.clear();
        Ok(removed)
    }

    async fn insert_many(&self, new_accounts: &[NewAccount]) -> Result<(), StoreError> {
        let mut accounts = self.lock()?;
        accounts.check(new_accounts)?;
        accounts.append(new_accounts);
        Ok(())
    }

    async fn replace_all(&self, new_accounts: &[NewAccount]) -> Result<u64, StoreError> {
        let mut accounts = self.lock()?;
        Accounts::default().check(new_accounts)?;
        let removed = accounts.rows.len() as u64;
        accounts.rows.clear();
        accounts.append(new_accounts);
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.lock()?.rows.clone())
    }

    async fn get(&self, id: i64) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.rows.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.rows.iter().find(|a| a.email == email).cloned())
    }
}

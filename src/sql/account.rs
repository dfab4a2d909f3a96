//! Account operations for PostgreSQL database.
//!
//! Email uniqueness is enforced by the `accounts.email` unique constraint; a violation
//! surfaces as [`StoreError::AlreadyExists`] and rolls back the whole batch.

use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::StoreError;
use crate::account::{Account, AccountStore, NewAccount, Role};

/// Result type for database operations.
pub type SqlResult<T> = Result<T, StoreError>;

type AccountRow = (i64, String, String, String, String, DateTime<Utc>);

fn from_row((id, name, email, password_hash, role, created_at): AccountRow) -> SqlResult<Account> {
    Ok(Account {
        id,
        name,
        email,
        password_hash,
        role: role.parse::<Role>()?,
        created_at,
    })
}

/// Deletes every account in the transaction, returning how many rows were removed.
pub async fn delete_all(tx: &mut Transaction<'_, Postgres>) -> SqlResult<u64> {
    let result = sqlx::query("DELETE FROM accounts")
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Inserts one account.
///
/// # Returns
/// * `Ok(id)` - Account created
/// * `Err(StoreError::AlreadyExists)` - The email is taken
/// * `Err(StoreError::Internal)` - Database error
pub async fn insert(tx: &mut Transaction<'_, Postgres>, account: &NewAccount) -> SqlResult<i64> {
    let result = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO accounts (name, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&account.name)
    .bind(&account.email)
    .bind(&account.password_hash)
    .bind(account.role.as_str())
    .fetch_one(&mut **tx)
    .await;

    match result {
        Ok((id,)) => Ok(id),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(StoreError::AlreadyExists(account.email.clone()))
        }
        Err(e) => {
            tracing::error!(error = %e, "database error inserting account");
            Err(StoreError::from(e))
        }
    }
}

/// [`AccountStore`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Wraps `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_all(&mut tx).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn insert_many(&self, accounts: &[NewAccount]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for account in accounts {
            // dropping the transaction on error rolls back the earlier inserts
            insert(&mut tx, account).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_all(&self, accounts: &[NewAccount]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_all(&mut tx).await?;
        for account in accounts {
            insert(&mut tx, account).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, password_hash, role, created_at
            FROM accounts
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(from_row).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, password_hash, role, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, password_hash, role, created_at
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(from_row).transpose()
    }
}

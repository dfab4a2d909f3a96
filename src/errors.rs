//! Error types for lifeec storage and connection operations.

/// Errors that can occur during account and document store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested item was not found in the store.
    NotFound,
    /// An item with the same unique key (for accounts, the email) already exists.
    AlreadyExists(String),
    /// A stored value could not be decoded.
    Corrupt(String),
    /// An internal storage system error occurred.
    Internal(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Item not found in store"),
            Self::AlreadyExists(key) => write!(f, "Item already exists in store: {}", key),
            Self::Corrupt(msg) => write!(f, "Corrupt stored value: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::AlreadyExists(db_err.message().to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(e.to_string())
            }
            _ => StoreError::Internal(e.to_string()),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors raised by the connection manager and its drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// No datastore URI was configured.
    MissingUri,
    /// A handle is already live; only one is allowed per manager.
    AlreadyConnected,
    /// The manager was closed and cannot be reconnected.
    Closed,
    /// The driver could not reach the datastore.
    Unreachable(String),
    /// A liveness probe against an established handle failed.
    Probe(String),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUri => write!(f, "no datastore URI configured"),
            Self::AlreadyConnected => write!(f, "datastore connection already established"),
            Self::Closed => write!(f, "datastore connection has been closed"),
            Self::Unreachable(msg) => write!(f, "datastore unreachable: {}", msg),
            Self::Probe(msg) => write!(f, "datastore probe failed: {}", msg),
        }
    }
}

impl std::error::Error for ConnectionError {}

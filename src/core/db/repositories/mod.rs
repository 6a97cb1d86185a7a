//! Store abstractions for tokenwarden
//!
//! Each store is a trait with a PostgreSQL implementation for production and an
//! in-memory implementation for tests and local runs. The session manager is
//! generic over both traits.

pub mod refresh_token;
pub mod user;

pub use refresh_token::{
    DEFAULT_REFRESH_TOKEN_TTL_DAYS, InMemoryRefreshTokenStore, PgRefreshTokenStore,
    RefreshTokenStore, hash_token,
};
pub use user::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};

/// Errors raised by any store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record already exists")]
    Duplicate,

    #[error("Store operation timed out")]
    Timeout,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl StoreError {
    /// Map a write failure, turning unique-constraint violations into `Duplicate`
    pub fn from_write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::DatabaseError(err),
        }
    }

    /// Poisoned-lock failure of an in-memory store
    pub(crate) fn poisoned() -> Self {
        StoreError::Unavailable("Lock poisoned".to_string())
    }
}

/// Outcome of a keyed lookup.
///
/// Absence is a valid answer and is kept apart from a failed query so callers
/// decide explicitly which failures to mask.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Failed(StoreError),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Collapse back into the conventional `Result<Option<T>, _>` shape
    pub fn into_result(self) -> Result<Option<T>, StoreError> {
        match self {
            Lookup::Found(value) => Ok(Some(value)),
            Lookup::NotFound => Ok(None),
            Lookup::Failed(err) => Err(err),
        }
    }
}

impl<T> From<Result<Option<T>, StoreError>> for Lookup<T> {
    fn from(result: Result<Option<T>, StoreError>) -> Self {
        match result {
            Ok(Some(value)) => Lookup::Found(value),
            Ok(None) => Lookup::NotFound,
            Err(err) => Lookup::Failed(err),
        }
    }
}

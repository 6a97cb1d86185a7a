//! Credential store
//!
//! Persists user identity records. Emails are expected to be normalized by the
//! caller (see `normalize_email`).

use std::future::Future;
use std::sync::RwLock;

use sqlx::PgPool;
use uuid::Uuid;

use super::{Lookup, StoreError};
use crate::core::db::models::User;

/// Storage contract for user identities
pub trait CredentialStore: Send + Sync {
    /// Insert a new identity; `StoreError::Duplicate` if the email is taken
    fn create(&self, user: &User) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Find a user by email
    fn find_by_email(&self, email: &str) -> impl Future<Output = Lookup<User>> + Send;

    /// Find a user by ID
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = Lookup<User>> + Send;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// Credential store backed by the `users` table
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new credential store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for PgCredentialStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, is_verified, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_write)?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Lookup<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_verified, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)
        .into()
    }

    async fn find_by_id(&self, id: Uuid) -> Lookup<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_verified, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)
        .into()
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory credential store for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<Vec<User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a user; lets tests simulate an account disappearing
    pub fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().map_err(|_| StoreError::poisoned())?;
        let len_before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() != len_before)
    }

    pub fn len(&self) -> usize {
        self.users.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_where(&self, pred: impl Fn(&User) -> bool) -> Lookup<User> {
        let Ok(users) = self.users.read() else {
            return Lookup::Failed(StoreError::poisoned());
        };

        match users.iter().find(|u| pred(u)) {
            Some(user) => Lookup::Found(user.clone()),
            None => Lookup::NotFound,
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| StoreError::poisoned())?;

        if users.iter().any(|u| u.email == user.email || u.id == user.id) {
            return Err(StoreError::Duplicate);
        }

        users.push(user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Lookup<User> {
        self.find_where(|u| u.email == email)
    }

    async fn find_by_id(&self, id: Uuid) -> Lookup<User> {
        self.find_where(|u| u.id == id)
    }
}

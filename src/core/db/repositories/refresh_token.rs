//! Refresh token store
//!
//! Tracks issued refresh tokens server-side so they can be revoked before their
//! embedded expiry. Tokens are stored as SHA-256 hashes; the raw token is only
//! ever held by the client.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreError;
use crate::core::db::models::RefreshTokenRecord;

/// Default record lifetime (7 days)
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Hash a token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Storage contract for refresh-token records
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a record for `token`, or re-activate the same user's existing
    /// record for it (clearing the revoked flag and resetting expiry).
    ///
    /// A token already recorded for a different user yields `StoreError::Duplicate`.
    fn store(&self, user_id: Uuid, token: &str)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// True only if a matching record exists, is not revoked and has not expired
    fn is_valid(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Atomically revoke `old_token` and record `new_token`.
    ///
    /// Returns `false` and writes nothing when `old_token` is not valid at the
    /// moment of the swap.
    fn rotate(
        &self,
        user_id: Uuid,
        old_token: &str,
        new_token: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Revoke one record; `false` if no active record matched
    fn revoke(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Revoke every active record of a user, returning how many were revoked
    fn revoke_all_for_user(&self, user_id: Uuid)
    -> impl Future<Output = Result<u64, StoreError>> + Send;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// Refresh token store backed by the `refresh_tokens` table
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgRefreshTokenStore {
    /// Create a new refresh token store with the default 7 day lifetime
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: Duration::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
        }
    }

    /// Set record lifetime
    pub fn ttl_days(mut self, days: i64) -> Self {
        self.ttl = Duration::days(days);
        self
    }

    /// Fetch a record by raw token
    pub async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, token_hash, expires_at, is_revoked, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

impl RefreshTokenStore for PgRefreshTokenStore {
    async fn store(&self, user_id: Uuid, token: &str) -> Result<(), StoreError> {
        let now = Utc::now();

        // The conditional update leaves another user's record untouched (0 rows).
        let result = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, is_revoked, created_at)
            VALUES ($1, $2, $3, $4, false, $5)
            ON CONFLICT (token_hash) DO UPDATE
            SET is_revoked = false, expires_at = EXCLUDED.expires_at
            WHERE refresh_tokens.user_id = EXCLUDED.user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(hash_token(token))
        .bind(now + self.ttl)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate);
        }

        Ok(())
    }

    async fn is_valid(&self, user_id: Uuid, token: &str) -> Result<bool, StoreError> {
        let row: Option<(bool, chrono::DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT is_revoked, expires_at
            FROM refresh_tokens
            WHERE user_id = $1 AND token_hash = $2
            "#,
        )
        .bind(user_id)
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((is_revoked, expires_at)) => !is_revoked && expires_at > Utc::now(),
            None => false,
        })
    }

    async fn rotate(
        &self,
        user_id: Uuid,
        old_token: &str,
        new_token: &str,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Concurrent rotations of the same row serialize on the row lock; the
        // loser re-reads `is_revoked = true` and matches nothing.
        let consumed = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true
            WHERE user_id = $1 AND token_hash = $2 AND is_revoked = false AND expires_at > $3
            "#,
        )
        .bind(user_id)
        .bind(hash_token(old_token))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, is_revoked, created_at)
            VALUES ($1, $2, $3, $4, false, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(hash_token(new_token))
        .bind(now + self.ttl)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_write)?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke(&self, user_id: Uuid, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true
            WHERE user_id = $1 AND token_hash = $2 AND is_revoked = false
            "#,
        )
        .bind(user_id)
        .bind(hash_token(token))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true
            WHERE user_id = $1 AND is_revoked = false
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory refresh token store; every operation runs under one mutex
#[derive(Debug)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
    ttl: Duration,
}

impl Default for InMemoryRefreshTokenStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl: Duration::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
        }
    }
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set record lifetime; a negative value makes new records expire immediately
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Snapshot of a record by raw token
    pub fn record(&self, token: &str) -> Option<RefreshTokenRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&hash_token(token)).cloned())
    }

    /// Number of records (active or not) held for a user
    pub fn count_for_user(&self, user_id: Uuid) -> usize {
        self.records
            .lock()
            .map(|records| records.values().filter(|r| r.user_id == user_id).count())
            .unwrap_or(0)
    }

    fn new_record(&self, user_id: Uuid, token_hash: String) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            expires_at: now + self.ttl,
            is_revoked: false,
            created_at: now,
        }
    }
}

impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store(&self, user_id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::poisoned())?;
        let token_hash = hash_token(token);

        match records.get_mut(&token_hash) {
            Some(existing) if existing.user_id == user_id => {
                existing.is_revoked = false;
                existing.expires_at = Utc::now() + self.ttl;
            }
            Some(_) => return Err(StoreError::Duplicate),
            None => {
                let record = self.new_record(user_id, token_hash.clone());
                records.insert(token_hash, record);
            }
        }

        Ok(())
    }

    async fn is_valid(&self, user_id: Uuid, token: &str) -> Result<bool, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::poisoned())?;

        Ok(records
            .get(&hash_token(token))
            .is_some_and(|r| r.user_id == user_id && r.is_active_at(Utc::now())))
    }

    async fn rotate(
        &self,
        user_id: Uuid,
        old_token: &str,
        new_token: &str,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::poisoned())?;
        let new_hash = hash_token(new_token);

        if records.contains_key(&new_hash) {
            return Err(StoreError::Duplicate);
        }

        let Some(old) = records
            .get_mut(&hash_token(old_token))
            .filter(|r| r.user_id == user_id && r.is_active_at(Utc::now()))
        else {
            return Ok(false);
        };
        old.is_revoked = true;

        let record = self.new_record(user_id, new_hash.clone());
        records.insert(new_hash, record);
        Ok(true)
    }

    async fn revoke(&self, user_id: Uuid, token: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::poisoned())?;

        match records.get_mut(&hash_token(token)) {
            Some(record) if record.user_id == user_id && !record.is_revoked => {
                record.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::poisoned())?;

        let mut revoked = 0;
        for record in records
            .values_mut()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
        {
            record.is_revoked = true;
            revoked += 1;
        }

        Ok(revoked)
    }
}

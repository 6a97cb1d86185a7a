//! Database models for tokenwarden
//!
//! This module defines the entity structs that map to the PostgreSQL tables
//! created by `migrations/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// User Model
// ============================================================================

/// User identity record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a fresh, unverified user from an already hashed password
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            is_verified: false,
            created_at: Utc::now(),
        }
    }
}

/// Trim and lower-case an email so lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Refresh Token Model
// ============================================================================

/// Server-side record of an issued refresh token.
///
/// Only the SHA-256 digest of the token is kept; the raw token lives with the client.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// A record is usable while it is neither revoked nor past its expiry
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("a@x.com", "$2b$04$hash");

        assert_eq!(user.email, "a@x.com");
        assert!(!user.is_verified);
        assert!(user.created_at <= Utc::now());
    }

    #[test]
    fn test_new_users_get_distinct_ids() {
        let a = User::new("a@x.com", "h");
        let b = User::new("a@x.com", "h");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_user_serialization_omits_password_hash() {
        let user = User::new("a@x.com", "super_secret_hash");
        let json = serde_json::to_string(&user).unwrap();

        assert!(!json.contains("password_hash"));
        assert!(!json.contains("super_secret_hash"));
        assert!(json.contains("is_verified"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
        assert_eq!(normalize_email("a@x.com"), "a@x.com");
    }

    #[test]
    fn test_refresh_record_activity() {
        let now = Utc::now();
        let mut record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "abc".to_string(),
            expires_at: now + Duration::days(7),
            is_revoked: false,
            created_at: now,
        };

        assert!(record.is_active_at(now));
        assert!(!record.is_active_at(now + Duration::days(8)));

        record.is_revoked = true;
        assert!(!record.is_active_at(now));
    }
}

//! Password hashing
//!
//! bcrypt with an automatic per-hash salt. Hashing and verification are slow on
//! purpose, so the async entry points move the work onto the blocking pool.

use super::service::AuthError;

/// Cost factor for bcrypt hashing (12 is recommended for production)
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Lowest cost bcrypt accepts; tests hash at this cost
pub const MIN_BCRYPT_COST: u32 = 4;

/// Highest cost bcrypt accepts
pub const MAX_BCRYPT_COST: u32 = 31;

/// bcrypt hasher with a fixed cost and a dummy hash for timing equalization
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: String,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("cost", &self.cost)
            .finish()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher {
    /// Create a hasher; costs outside bcrypt's range are clamped into it
    pub fn new(cost: u32) -> Self {
        let cost = cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST);
        // A hash of a random value; verifying against it costs the same as a real check.
        let dummy_hash = bcrypt::hash(uuid::Uuid::new_v4().to_string(), cost).unwrap_or_default();

        Self { cost, dummy_hash }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password using bcrypt with automatic salt generation
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| AuthError::InternalError(format!("password hashing failed: {e}")))
    }

    /// Verify a password against a bcrypt hash
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        bcrypt::verify(password, hash)
            .map_err(|e| AuthError::InternalError(format!("password verification failed: {e}")))
    }

    /// Hash on the blocking pool
    pub async fn hash_async(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::InternalError(format!("hashing task failed: {e}")))?
    }

    /// Verify on the blocking pool
    pub async fn verify_async(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::InternalError(format!("verification task failed: {e}")))?
    }

    /// Burn one verification against the dummy hash.
    ///
    /// Used when no account matches so the response time does not reveal it.
    pub async fn verify_dummy(&self, password: &str) {
        let dummy = self.dummy_hash.clone();
        let _ = self.verify_async(password, &dummy).await;
    }
}

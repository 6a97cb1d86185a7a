//! Session manager
//!
//! Implements register / login / refresh / verify (plus logout) on top of the
//! credential store, the refresh token store and the token authority. This is
//! where the session lifecycle rules live:
//!
//! - login failures never reveal whether the email exists
//! - a refresh token must pass both its own signature/expiry and the store record
//! - verify re-reads the account so a removed user loses access immediately
//! - every store call in one operation shares a deadline; an elapsed deadline
//!   surfaces as `StoreError::Timeout` and is never retried

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::jwt::{JwtError, TokenAuthority, TokenPair};
use super::password::PasswordHasher;
use crate::core::db::models::{User, normalize_email};
use crate::core::db::repositories::{CredentialStore, Lookup, RefreshTokenStore, StoreError};

/// Default deadline applied to the store calls of one operation
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Session manager error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User already exists")]
    AlreadyExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Store and signing failures, as opposed to rejections of caller input
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Store(_) | AuthError::InternalError(_))
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        if err.is_rejection() {
            AuthError::InvalidToken
        } else {
            AuthError::InternalError(err.to_string())
        }
    }
}

/// What happens to the presented refresh token when it is exchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// Revoke the old record and insert the new one atomically; the old token is single-use
    #[default]
    Consume,
    /// Only insert the new record; the old token stays usable until it expires or is revoked
    Retain,
}

impl FromStr for RotationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consume" => Ok(RotationPolicy::Consume),
            "retain" => Ok(RotationPolicy::Retain),
            other => Err(format!("unknown rotation policy: {other}")),
        }
    }
}

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for the store calls of one operation
    pub store_timeout: Duration,
    /// Refresh token rotation policy
    pub rotation: RotationPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            rotation: RotationPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Set store deadline
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set rotation policy
    pub fn rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Session manager
pub struct SessionManager<C, R> {
    credentials: Arc<C>,
    refresh_tokens: Arc<R>,
    authority: TokenAuthority,
    hasher: PasswordHasher,
    config: SessionConfig,
}

impl<C, R> Clone for SessionManager<C, R> {
    fn clone(&self) -> Self {
        Self {
            credentials: Arc::clone(&self.credentials),
            refresh_tokens: Arc::clone(&self.refresh_tokens),
            authority: self.authority.clone(),
            hasher: self.hasher.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C, R> SessionManager<C, R>
where
    C: CredentialStore,
    R: RefreshTokenStore,
{
    /// Create a new session manager
    pub fn new(
        credentials: C,
        refresh_tokens: R,
        authority: TokenAuthority,
        hasher: PasswordHasher,
        config: SessionConfig,
    ) -> Self {
        Self {
            credentials: Arc::new(credentials),
            refresh_tokens: Arc::new(refresh_tokens),
            authority,
            hasher,
            config,
        }
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub fn refresh_tokens(&self) -> &R {
        &self.refresh_tokens
    }

    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.store_timeout
    }

    async fn bounded<T>(
        deadline: Instant,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout_at(deadline, call)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    async fn bounded_lookup<T>(deadline: Instant, call: impl Future<Output = Lookup<T>>) -> Lookup<T> {
        tokio::time::timeout_at(deadline, call)
            .await
            .unwrap_or(Lookup::Failed(StoreError::Timeout))
    }

    /// Register a new user
    pub async fn register(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let deadline = self.deadline();
        let email = normalize_email(email);

        match Self::bounded_lookup(deadline, self.credentials.find_by_email(&email)).await {
            Lookup::Found(_) => return Err(AuthError::AlreadyExists),
            Lookup::NotFound => {}
            Lookup::Failed(err) => {
                tracing::error!(error = %err, "Credential lookup failed during registration");
                return Err(err.into());
            }
        }

        let password_hash = self.hasher.hash_async(password).await?;
        let user = User::new(email, password_hash);

        match Self::bounded(deadline, self.credentials.create(&user)).await {
            Ok(()) => {}
            // lost a race with a concurrent registration of the same email
            Err(StoreError::Duplicate) => return Err(AuthError::AlreadyExists),
            Err(err) => return Err(err.into()),
        }

        tracing::info!(user_id = %user.id, "User registered");
        Ok(())
    }

    /// Authenticate and issue a fresh token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let deadline = self.deadline();
        let email = normalize_email(email);

        let user = match Self::bounded_lookup(deadline, self.credentials.find_by_email(&email)).await
        {
            Lookup::Found(user) => user,
            Lookup::NotFound => {
                self.hasher.verify_dummy(password).await;
                return Err(AuthError::InvalidCredentials);
            }
            Lookup::Failed(StoreError::Timeout) => return Err(StoreError::Timeout.into()),
            Lookup::Failed(err) => {
                tracing::warn!(error = %err, "Credential lookup failed during login");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let matches = match self.hasher.verify_async(password, &user.password_hash).await {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!(user_id = %user.id, error = %err, "Stored password hash unusable");
                false
            }
        };
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.authority.issue_token_pair(user.id)?;
        Self::bounded(
            deadline,
            self.refresh_tokens.store(user.id, &tokens.refresh_token),
        )
        .await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let deadline = self.deadline();

        let user_id = self
            .authority
            .verify_refresh_token(refresh_token)
            .and_then(|claims| claims.user_id())
            .map_err(|err| {
                tracing::debug!(reason = %err, "Refresh token rejected");
                AuthError::from(err)
            })?;

        let valid = Self::bounded(
            deadline,
            self.refresh_tokens.is_valid(user_id, refresh_token),
        )
        .await?;
        if !valid {
            tracing::debug!(%user_id, "Refresh token unknown, revoked or expired");
            return Err(AuthError::InvalidToken);
        }

        let tokens = self.authority.issue_token_pair(user_id)?;

        match self.config.rotation {
            RotationPolicy::Consume => {
                let rotated = Self::bounded(
                    deadline,
                    self.refresh_tokens
                        .rotate(user_id, refresh_token, &tokens.refresh_token),
                )
                .await?;
                if !rotated {
                    tracing::warn!(%user_id, "Refresh token consumed by a concurrent refresh");
                    return Err(AuthError::InvalidToken);
                }
            }
            RotationPolicy::Retain => {
                Self::bounded(
                    deadline,
                    self.refresh_tokens.store(user_id, &tokens.refresh_token),
                )
                .await?;
            }
        }

        tracing::info!(%user_id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Validate an access token and confirm the account still exists
    pub async fn verify(&self, access_token: &str) -> Result<Uuid, AuthError> {
        let deadline = self.deadline();

        let user_id = self
            .authority
            .verify_access_token(access_token)
            .and_then(|claims| claims.user_id())?;

        match Self::bounded_lookup(deadline, self.credentials.find_by_id(user_id)).await {
            Lookup::Found(user) => Ok(user.id),
            Lookup::NotFound => Err(AuthError::UserNotFound),
            Lookup::Failed(StoreError::Timeout) => Err(StoreError::Timeout.into()),
            Lookup::Failed(err) => {
                tracing::warn!(%user_id, error = %err, "Credential lookup failed during verify");
                Err(AuthError::UserNotFound)
            }
        }
    }

    /// Revoke the record behind a refresh token
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let deadline = self.deadline();

        let user_id = self
            .authority
            .verify_refresh_token(refresh_token)
            .and_then(|claims| claims.user_id())?;

        let revoked =
            Self::bounded(deadline, self.refresh_tokens.revoke(user_id, refresh_token)).await?;
        if !revoked {
            return Err(AuthError::InvalidToken);
        }

        tracing::info!(%user_id, "User logged out");
        Ok(())
    }

    /// Revoke every refresh token of a user
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let deadline = self.deadline();

        let count =
            Self::bounded(deadline, self.refresh_tokens.revoke_all_for_user(user_id)).await?;

        tracing::info!(%user_id, revoked = count, "All sessions revoked");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::JwtConfig;
    use crate::core::auth::password::MIN_BCRYPT_COST;
    use crate::core::db::repositories::{InMemoryCredentialStore, InMemoryRefreshTokenStore};

    type TestManager = SessionManager<InMemoryCredentialStore, InMemoryRefreshTokenStore>;

    const TEST_SECRET: &str = "session_manager_test_secret";

    fn create_manager(rotation: RotationPolicy) -> TestManager {
        SessionManager::new(
            InMemoryCredentialStore::new(),
            InMemoryRefreshTokenStore::new(),
            TokenAuthority::new(JwtConfig::new(TEST_SECRET)),
            PasswordHasher::new(MIN_BCRYPT_COST),
            SessionConfig::default().rotation(rotation),
        )
    }

    async fn user_id_of<C: CredentialStore, R: RefreshTokenStore>(
        manager: &SessionManager<C, R>,
        email: &str,
    ) -> Uuid {
        match manager.credentials().find_by_email(email).await {
            Lookup::Found(user) => user.id,
            other => panic!("expected registered user, got {:?}", other),
        }
    }

    // ========================================================================
    // Test doubles
    // ========================================================================

    #[derive(Clone, Copy)]
    enum Fault {
        Slow,
        Broken,
    }

    struct FaultyCredentialStore(Fault);

    impl FaultyCredentialStore {
        async fn fail<T>(&self) -> Lookup<T> {
            match self.0 {
                Fault::Slow => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Lookup::NotFound
                }
                Fault::Broken => Lookup::Failed(StoreError::Unavailable("down".to_string())),
            }
        }
    }

    impl CredentialStore for FaultyCredentialStore {
        async fn create(&self, _user: &User) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn find_by_email(&self, _email: &str) -> Lookup<User> {
            self.fail().await
        }

        async fn find_by_id(&self, _id: Uuid) -> Lookup<User> {
            self.fail().await
        }
    }

    /// Accepts reads, fails every write
    #[derive(Default)]
    struct ReadOnlyRefreshTokenStore;

    impl RefreshTokenStore for ReadOnlyRefreshTokenStore {
        async fn store(&self, _user_id: Uuid, _token: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read only".to_string()))
        }

        async fn is_valid(&self, _user_id: Uuid, _token: &str) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn rotate(&self, _u: Uuid, _old: &str, _new: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("read only".to_string()))
        }

        async fn revoke(&self, _user_id: Uuid, _token: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("read only".to_string()))
        }

        async fn revoke_all_for_user(&self, _user_id: Uuid) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("read only".to_string()))
        }
    }

    fn faulty_manager(fault: Fault) -> SessionManager<FaultyCredentialStore, InMemoryRefreshTokenStore> {
        SessionManager::new(
            FaultyCredentialStore(fault),
            InMemoryRefreshTokenStore::new(),
            TokenAuthority::new(JwtConfig::new(TEST_SECRET)),
            PasswordHasher::new(MIN_BCRYPT_COST),
            SessionConfig::default().store_timeout(Duration::from_millis(50)),
        )
    }

    // ========================================================================
    // Register
    // ========================================================================

    #[tokio::test]
    async fn test_register_creates_unverified_user() {
        let manager = create_manager(RotationPolicy::Consume);

        manager.register("a@x.com", "secret1").await.unwrap();

        match manager.credentials().find_by_email("a@x.com").await {
            Lookup::Found(user) => {
                assert!(!user.is_verified);
                assert_ne!(user.password_hash, "secret1");
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();

        let result = manager.register("a@x.com", "other_pw").await;
        assert!(matches!(result, Err(AuthError::AlreadyExists)));

        // email matching ignores case and surrounding whitespace
        let result = manager.register("  A@X.com ", "other_pw").await;
        assert!(matches!(result, Err(AuthError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_register_surfaces_lookup_failure() {
        let manager = faulty_manager(Fault::Broken);

        let result = manager.register("a@x.com", "secret1").await;
        assert!(matches!(
            result,
            Err(AuthError::Store(StoreError::Unavailable(_)))
        ));
    }

    // ========================================================================
    // Login
    // ========================================================================

    #[tokio::test]
    async fn test_login_returns_structurally_valid_pair() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();

        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        assert_eq!(tokens.access_token.split('.').count(), 3);
        assert_eq!(tokens.refresh_token.split('.').count(), 3);
        assert_eq!(tokens.token_type, "Bearer");

        let user_id = user_id_of(&manager, "a@x.com").await;
        assert!(
            manager
                .refresh_tokens()
                .is_valid(user_id, &tokens.refresh_token)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_login_wrong_password_matches_unknown_email() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();

        let wrong_password = manager.login("a@x.com", "wrong").await.unwrap_err();
        let unknown_email = manager.login("b@x.com", "secret1").await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_login_masks_store_failure() {
        let manager = faulty_manager(Fault::Broken);

        let result = manager.login("a@x.com", "secret1").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_propagates_timeout() {
        let manager = faulty_manager(Fault::Slow);

        let result = manager.login("a@x.com", "secret1").await;
        assert!(matches!(result, Err(AuthError::Store(StoreError::Timeout))));
    }

    #[tokio::test]
    async fn test_login_with_unrepresentable_lifetime_is_internal_error() {
        let manager = SessionManager::new(
            InMemoryCredentialStore::new(),
            InMemoryRefreshTokenStore::new(),
            TokenAuthority::new(JwtConfig::new(TEST_SECRET).refresh_token_expiration(100_000_000)),
            PasswordHasher::new(MIN_BCRYPT_COST),
            SessionConfig::default(),
        );
        manager.register("a@x.com", "secret1").await.unwrap();

        let result = manager.login("a@x.com", "secret1").await;
        assert!(matches!(result, Err(AuthError::InternalError(_))));
    }

    #[tokio::test]
    async fn test_login_fails_whole_when_refresh_token_cannot_be_stored() {
        let credentials = InMemoryCredentialStore::new();
        let hasher = PasswordHasher::new(MIN_BCRYPT_COST);
        credentials
            .create(&User::new("a@x.com", hasher.hash("secret1").unwrap()))
            .await
            .unwrap();

        let manager = SessionManager::new(
            credentials,
            ReadOnlyRefreshTokenStore,
            TokenAuthority::new(JwtConfig::new(TEST_SECRET)),
            hasher,
            SessionConfig::default(),
        );

        let result = manager.login("a@x.com", "secret1").await;
        assert!(matches!(
            result,
            Err(AuthError::Store(StoreError::Unavailable(_)))
        ));
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    #[tokio::test]
    async fn test_refresh_returns_new_pair() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let first = manager.login("a@x.com", "secret1").await.unwrap();

        let second = manager.refresh(&first.refresh_token).await.unwrap();

        assert_ne!(second.access_token, first.access_token);
        assert_ne!(second.refresh_token, first.refresh_token);
    }

    #[tokio::test]
    async fn test_refresh_with_unstored_token_fails() {
        let manager = create_manager(RotationPolicy::Consume);
        // correctly signed, but never recorded
        let stray = manager
            .authority()
            .issue_refresh_token(Uuid::new_v4())
            .unwrap();

        let result = manager.refresh(&stray.token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_refresh_with_revoked_token_fails() {
        let manager = create_manager(RotationPolicy::Retain);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();
        let user_id = user_id_of(&manager, "a@x.com").await;

        // usable before revocation
        assert!(manager.refresh(&tokens.refresh_token).await.is_ok());

        manager
            .refresh_tokens()
            .revoke(user_id, &tokens.refresh_token)
            .await
            .unwrap();

        let result = manager.refresh(&tokens.refresh_token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        let result = manager.refresh(&tokens.access_token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_refresh_rejects_foreign_secret() {
        let manager = create_manager(RotationPolicy::Consume);
        let foreign = TokenAuthority::new(JwtConfig::new("another_secret"))
            .issue_refresh_token(Uuid::new_v4())
            .unwrap();

        let result = manager.refresh(&foreign.token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_consume_policy_makes_refresh_token_single_use() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        let rotated = manager.refresh(&tokens.refresh_token).await.unwrap();

        let replay = manager.refresh(&tokens.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::InvalidToken)));
        assert!(manager.refresh(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_retain_policy_leaves_old_token_usable() {
        let manager = create_manager(RotationPolicy::Retain);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        manager.refresh(&tokens.refresh_token).await.unwrap();

        assert!(manager.refresh(&tokens.refresh_token).await.is_ok());
    }

    async fn race_refreshes(manager: TestManager, token: String, contenders: usize) -> usize {
        let mut handles = Vec::with_capacity(contenders);
        for _ in 0..contenders {
            let manager = manager.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move { manager.refresh(&token).await }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(matches!(err, AuthError::InvalidToken)),
            }
        }
        successes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_under_consume_has_one_winner() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        let successes = race_refreshes(manager, tokens.refresh_token, 8).await;
        assert_eq!(successes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_under_retain_all_succeed() {
        let manager = create_manager(RotationPolicy::Retain);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        let successes = race_refreshes(manager, tokens.refresh_token, 8).await;
        assert_eq!(successes, 8);
    }

    // ========================================================================
    // Verify
    // ========================================================================

    #[tokio::test]
    async fn test_verify_returns_registered_user_id() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        let user_id = manager.verify(&tokens.access_token).await.unwrap();
        assert_eq!(user_id, user_id_of(&manager, "a@x.com").await);
    }

    #[tokio::test]
    async fn test_verify_rejects_refresh_token() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        let result = manager.verify(&tokens.refresh_token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_verify_after_account_removed() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();
        let user_id = user_id_of(&manager, "a@x.com").await;

        manager.credentials().remove(user_id).unwrap();

        let result = manager.verify(&tokens.access_token).await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_verify_store_failure_is_user_not_found() {
        let manager = faulty_manager(Fault::Broken);
        let token = manager
            .authority()
            .issue_access_token(Uuid::new_v4())
            .unwrap();

        let result = manager.verify(&token.token).await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_verify_propagates_timeout() {
        let manager = faulty_manager(Fault::Slow);
        let token = manager
            .authority()
            .issue_access_token(Uuid::new_v4())
            .unwrap();

        let result = manager.verify(&token.token).await;
        assert!(matches!(result, Err(AuthError::Store(StoreError::Timeout))));
    }

    // ========================================================================
    // Logout
    // ========================================================================

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let tokens = manager.login("a@x.com", "secret1").await.unwrap();

        manager.logout(&tokens.refresh_token).await.unwrap();

        assert!(matches!(
            manager.refresh(&tokens.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            manager.logout(&tokens.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_logout_all() {
        let manager = create_manager(RotationPolicy::Consume);
        manager.register("a@x.com", "secret1").await.unwrap();
        let first = manager.login("a@x.com", "secret1").await.unwrap();
        let second = manager.login("a@x.com", "secret1").await.unwrap();
        let user_id = user_id_of(&manager, "a@x.com").await;

        assert_eq!(manager.logout_all(user_id).await.unwrap(), 2);

        assert!(manager.refresh(&first.refresh_token).await.is_err());
        assert!(manager.refresh(&second.refresh_token).await.is_err());
    }

    // ========================================================================
    // Error and policy tests
    // ========================================================================

    #[test]
    fn test_auth_error_from_jwt_error() {
        assert!(matches!(
            AuthError::from(JwtError::Expired),
            AuthError::InvalidToken
        ));
        assert!(matches!(
            AuthError::from(JwtError::InvalidAlgorithm),
            AuthError::InvalidToken
        ));
        assert!(matches!(
            AuthError::from(JwtError::Signing("boom".to_string())),
            AuthError::InternalError(_)
        ));
    }

    #[test]
    fn test_auth_error_internal_split() {
        assert!(AuthError::Store(StoreError::Timeout).is_internal());
        assert!(AuthError::InternalError("x".to_string()).is_internal());
        assert!(!AuthError::InvalidCredentials.is_internal());
        assert!(!AuthError::UserNotFound.is_internal());
    }

    #[test]
    fn test_rotation_policy_parse() {
        assert_eq!("consume".parse::<RotationPolicy>(), Ok(RotationPolicy::Consume));
        assert_eq!(" Retain ".parse::<RotationPolicy>(), Ok(RotationPolicy::Retain));
        assert!("sometimes".parse::<RotationPolicy>().is_err());
        assert_eq!(RotationPolicy::default(), RotationPolicy::Consume);
    }
}

//! Token authority
//!
//! Stateless signing and verification of access and refresh tokens. Tokens are
//! HS256 JWTs keyed by one process-wide secret; verification is a pure function
//! of that secret and the current time. Access tokens live 15 minutes, refresh
//! tokens 7 days.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access token expiration time (15 minutes)
const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 15;

/// Default refresh token expiration time (7 days)
const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 7;

/// The only algorithm accepted on verification
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Refresh token expiration in days
    pub refresh_token_expiration_days: i64,
    /// Token issuer
    pub issuer: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field(
                "access_token_expiration_minutes",
                &self.access_token_expiration_minutes,
            )
            .field(
                "refresh_token_expiration_days",
                &self.refresh_token_expiration_days,
            )
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtConfig {
    /// Create a new JWT configuration
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
            issuer: "tokenwarden".to_string(),
        }
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set refresh token expiration
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unexpected signing algorithm")]
    InvalidAlgorithm,

    #[error("Invalid token subject")]
    InvalidSubject,

    #[error("Invalid token type")]
    InvalidTokenType,
}

impl JwtError {
    /// Failures caused by the presented token rather than by this process
    pub fn is_rejection(&self) -> bool {
        !matches!(self, JwtError::Signing(_))
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                JwtError::InvalidAlgorithm
            }
            ErrorKind::InvalidSubject => JwtError::InvalidSubject,
            _ => JwtError::InvalidToken,
        }
    }
}

/// Token purpose, carried in the `token_type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// JWT ID; keeps tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// Get user ID as UUID
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidSubject)
    }
}

/// A freshly signed token and its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiration (Unix timestamp)
    pub expires_at: i64,
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived)
    pub refresh_token: String,
    /// Access token expiration (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiration (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

/// Signs and verifies tokens with the shared secret
#[derive(Clone)]
pub struct TokenAuthority {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenAuthority {
    /// Create a new token authority
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    fn issue(
        &self,
        user_id: Uuid,
        token_type: TokenType,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken, JwtError> {
        let now = Utc::now();
        let exp = ttl
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                JwtError::Signing(format!("{token_type} token lifetime out of range"))
            })?;

        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: exp.timestamp(),
        })
    }

    /// Issue an access token
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<IssuedToken, JwtError> {
        self.issue(
            user_id,
            TokenType::Access,
            Duration::try_minutes(self.config.access_token_expiration_minutes),
        )
    }

    /// Issue a refresh token
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<IssuedToken, JwtError> {
        self.issue(
            user_id,
            TokenType::Refresh,
            Duration::try_days(self.config.refresh_token_expiration_days),
        )
    }

    /// Issue both access and refresh tokens
    pub fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, JwtError> {
        let access = self.issue_access_token(user_id)?;
        let refresh = self.issue_refresh_token(user_id)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    /// Verify a token of either type against the current time
    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify_token_at(token, Utc::now())
    }

    /// Verify a token against an explicit point in time.
    ///
    /// Rejects bad signatures, any header algorithm other than HS256, a foreign
    /// issuer, `exp <= now` and a subject that is not a UUID.
    pub fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // Expiry is checked below against `now` so callers control the clock
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;

        if claims.exp <= now.timestamp() {
            return Err(JwtError::Expired);
        }
        claims.user_id()?;

        Ok(claims)
    }

    /// Verify a token and require it to be an access token
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        Self::expect_type(self.verify_token(token)?, TokenType::Access)
    }

    /// Verify a token and require it to be a refresh token
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        Self::expect_type(self.verify_token(token)?, TokenType::Refresh)
    }

    fn expect_type(claims: Claims, expected: TokenType) -> Result<Claims, JwtError> {
        if claims.token_type != expected {
            return Err(JwtError::InvalidTokenType);
        }
        Ok(claims)
    }
}

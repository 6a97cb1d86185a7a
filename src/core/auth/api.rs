//! Auth API endpoints
//!
//! Provides REST API endpoints over the session manager:
//! - POST /api/auth/register - Register a new user
//! - POST /api/auth/login - Login and get tokens
//! - POST /api/auth/refresh - Exchange a refresh token for a new pair
//! - POST /api/auth/verify-token - Resolve an access token to its user
//! - POST /api/auth/logout - Revoke a refresh token
//! - GET /api/auth/me - Current user, behind the bearer middleware

use axum::{
    Extension, Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::auth::{AuthError, SessionManager, TokenPair};
use crate::core::db::repositories::{CredentialStore, RefreshTokenStore};

/// Minimum password length accepted on registration
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Auth API state containing the session manager
pub struct AuthApiState<C, R> {
    pub sessions: SessionManager<C, R>,
}

impl<C, R> AuthApiState<C, R> {
    pub fn new(sessions: SessionManager<C, R>) -> Self {
        Self { sessions }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            code: code.into(),
        }
    }

    fn bad_request(error: impl Into<String>, code: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, code)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl AuthError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::AlreadyExists => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Store(_) | AuthError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AlreadyExists => "ALREADY_EXISTS",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Store(_) | AuthError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        // store and signing details stay in the logs
        let message = if err.is_internal() {
            tracing::error!(error = %err, "Auth request failed");
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        ApiError::new(err.status_code(), message, err.code())
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

/// Registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::bad_request(
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
                "PASSWORD_TOO_SHORT",
            ));
        }
        Ok(())
    }
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(ApiError::bad_request("Password is required", "MISSING_FIELD"));
        }
        Ok(())
    }
}

/// Refresh / logout request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl RefreshRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require_token(&self.refresh_token)
    }
}

/// Token verification request
#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

impl VerifyTokenRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require_token(&self.token)
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserIdResponse {
    pub user_id: Uuid,
}

/// Identity attached to requests that passed `require_auth`
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

fn looks_like_email(email: &str) -> bool {
    let email = email.trim();
    if email.contains(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if looks_like_email(email) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid email address", "INVALID_EMAIL"))
    }
}

fn require_token(token: &str) -> Result<(), ApiError> {
    if token.trim().is_empty() {
        Err(ApiError::bad_request("Token is required", "MISSING_FIELD"))
    } else {
        Ok(())
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the auth API router
pub fn auth_api_router<C, R>(state: AuthApiState<C, R>) -> Router
where
    C: CredentialStore + 'static,
    R: RefreshTokenStore + 'static,
{
    let state = Arc::new(state);

    let protected: Router<Arc<AuthApiState<C, R>>> = Router::new()
        .route("/api/auth/me", get(me_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth::<C, R>,
        ));

    Router::new()
        .route("/api/auth/register", post(register_handler::<C, R>))
        .route("/api/auth/login", post(login_handler::<C, R>))
        .route("/api/auth/refresh", post(refresh_handler::<C, R>))
        .route("/api/auth/verify-token", post(verify_token_handler::<C, R>))
        .route("/api/auth/logout", post(logout_handler::<C, R>))
        .merge(protected)
        .with_state(state)
}

/// Bearer-token middleware; puts `AuthUser` into the request extensions
pub async fn require_auth<C, R>(
    State(state): State<Arc<AuthApiState<C, R>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    C: CredentialStore + 'static,
    R: RefreshTokenStore + 'static,
{
    let token = extract_bearer_token(request.headers())?;
    let user_id = state.sessions.verify(&token).await?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}

/// POST /api/auth/register
async fn register_handler<C, R>(
    State(state): State<Arc<AuthApiState<C, R>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError>
where
    C: CredentialStore + 'static,
    R: RefreshTokenStore + 'static,
{
    request.validate()?;
    tracing::debug!("Registration attempt");

    state
        .sessions
        .register(&request.email, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

/// POST /api/auth/login
async fn login_handler<C, R>(
    State(state): State<Arc<AuthApiState<C, R>>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError>
where
    C: CredentialStore + 'static,
    R: RefreshTokenStore + 'static,
{
    request.validate()?;

    let tokens = state
        .sessions
        .login(&request.email, &request.password)
        .await?;

    Ok(Json(tokens))
}

/// POST /api/auth/refresh
async fn refresh_handler<C, R>(
    State(state): State<Arc<AuthApiState<C, R>>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError>
where
    C: CredentialStore + 'static,
    R: RefreshTokenStore + 'static,
{
    request.validate()?;
    tracing::debug!("Token refresh request");

    let tokens = state.sessions.refresh(&request.refresh_token).await?;

    Ok(Json(tokens))
}

/// POST /api/auth/verify-token
async fn verify_token_handler<C, R>(
    State(state): State<Arc<AuthApiState<C, R>>>,
    Json(request): Json<VerifyTokenRequest>,
) -> Result<Json<UserIdResponse>, ApiError>
where
    C: CredentialStore + 'static,
    R: RefreshTokenStore + 'static,
{
    request.validate()?;

    let user_id = state.sessions.verify(&request.token).await?;

    Ok(Json(UserIdResponse { user_id }))
}

/// POST /api/auth/logout
async fn logout_handler<C, R>(
    State(state): State<Arc<AuthApiState<C, R>>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, ApiError>
where
    C: CredentialStore + 'static,
    R: RefreshTokenStore + 'static,
{
    request.validate()?;

    state.sessions.logout(&request.refresh_token).await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// GET /api/auth/me
async fn me_handler(Extension(user): Extension<AuthUser>) -> Json<UserIdResponse> {
    Json(UserIdResponse {
        user_id: user.user_id,
    })
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::InvalidToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token.to_string())
}

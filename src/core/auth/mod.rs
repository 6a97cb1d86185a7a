//! Authentication module for tokenwarden
//!
//! This module provides:
//! - JWT access/refresh token issuing and validation
//! - bcrypt password hashing
//! - The session manager (register, login, refresh, verify, logout)
//! - REST API endpoints for auth operations

pub mod api;
pub mod jwt;
pub mod password;
pub mod service;

pub use api::{AuthApiState, AuthUser, auth_api_router, require_auth};
pub use jwt::{Claims, IssuedToken, JwtConfig, JwtError, TokenAuthority, TokenPair, TokenType};
pub use password::{DEFAULT_BCRYPT_COST, MAX_BCRYPT_COST, MIN_BCRYPT_COST, PasswordHasher};
pub use service::{AuthError, RotationPolicy, SessionConfig, SessionManager};

//! Database module for tokenwarden
//!
//! This module provides database connectivity, models, and the credential and
//! refresh-token stores.

pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use models::*;
pub use pool::{DbConfig, DbError, connect, create_pool, health_check, run_migrations};
pub use repositories::{
    CredentialStore, InMemoryCredentialStore, InMemoryRefreshTokenStore, Lookup,
    PgCredentialStore, PgRefreshTokenStore, RefreshTokenStore, StoreError,
};

// Re-export sqlx types that might be needed
pub use sqlx::PgPool;

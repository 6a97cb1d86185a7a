//! PostgreSQL pool
//!
//! `connect` is the startup path: open the pool, apply `migrations/`, then
//! run a health check once before the server accepts traffic.

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Pool settings; the URL comes from `Config`
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long a caller may wait for a free connection
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

/// Open a pool without touching the schema
pub async fn create_pool(config: &DbConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await?;

    Ok(pool)
}

/// Apply pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;

    tracing::info!("Database migrations applied");
    Ok(())
}

/// Round-trip a trivial query
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Pool, migrations and a health check, in that order
pub async fn connect(config: &DbConfig) -> Result<PgPool, DbError> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    health_check(&pool).await?;

    tracing::info!(max_connections = config.max_connections, "Database ready");
    Ok(pool)
}

/// Pool for the Postgres-backed tests, configured the way the server is
#[cfg(test)]
pub(crate) async fn test_pool() -> PgPool {
    use crate::core::Config;

    let config = Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some("db_test_secret".to_string()),
        _ => std::env::var(key).ok(),
    })
    .expect("DATABASE_URL must be set for database tests");

    connect(&config.db)
        .await
        .expect("Failed to create test pool")
}

use std::error::Error;

use tokenwarden::core::Config;
use tokenwarden::core::auth::{
    AuthApiState, PasswordHasher, SessionManager, TokenAuthority, auth_api_router,
};
use tokenwarden::core::db::{PgCredentialStore, PgRefreshTokenStore, connect};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tokenwarden=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        addr = %config.addr,
        issuer = %config.jwt.issuer,
        rotation = ?config.session.rotation,
        store_timeout_ms = config.session.store_timeout.as_millis() as u64,
        "Config loaded"
    );

    let pool = connect(&config.db).await?;

    let credentials = PgCredentialStore::new(pool.clone());
    let refresh_tokens =
        PgRefreshTokenStore::new(pool).ttl_days(config.jwt.refresh_token_expiration_days);

    let sessions = SessionManager::new(
        credentials,
        refresh_tokens,
        TokenAuthority::new(config.jwt.clone()),
        PasswordHasher::new(config.bcrypt_cost),
        config.session.clone(),
    );

    let app = auth_api_router(AuthApiState::new(sessions)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!("listening on http://{}", config.addr);

    axum::serve(listener, app).await?;
    Ok(())
}

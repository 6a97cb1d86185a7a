//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | required |
//! | `JWT_SECRET` | required |
//! | `JWT_ISSUER` | `tokenwarden` |
//! | `JWT_ACCESS_EXPIRATION_MINUTES` | 15 |
//! | `JWT_REFRESH_EXPIRATION_DAYS` | 7 |
//! | `APP_ADDR` | `0.0.0.0:8080` |
//! | `STORE_TIMEOUT_MS` | 5000 |
//! | `BCRYPT_COST` | 12 |
//! | `REFRESH_ROTATION` | `consume` |
//! | `DB_MAX_CONNECTIONS` | 10 |

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::core::auth::{DEFAULT_BCRYPT_COST, JwtConfig, RotationPolicy, SessionConfig};
use crate::core::db::DbConfig;

const DEFAULT_APP_ADDR: &str = "0.0.0.0:8080";

/// Accepted access token lifetimes, up to one day
const ACCESS_EXPIRATION_MINUTES: RangeInclusive<i64> = 1..=1_440;

/// Accepted refresh token lifetimes, up to one year
const REFRESH_EXPIRATION_DAYS: RangeInclusive<i64> = 1..=365;

/// Accepted store deadlines, up to one minute
const STORE_TIMEOUT_MS: RangeInclusive<u64> = 1..=60_000;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db: DbConfig,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let secret = required("JWT_SECRET")?;

        let mut jwt = JwtConfig::new(secret);
        if let Some(issuer) = lookup("JWT_ISSUER").filter(|v| !v.is_empty()) {
            jwt = jwt.issuer(issuer);
        }
        if let Some(minutes) = parse_in(
            &lookup,
            "JWT_ACCESS_EXPIRATION_MINUTES",
            ACCESS_EXPIRATION_MINUTES,
        )? {
            jwt = jwt.access_token_expiration(minutes);
        }
        if let Some(days) =
            parse_in(&lookup, "JWT_REFRESH_EXPIRATION_DAYS", REFRESH_EXPIRATION_DAYS)?
        {
            jwt = jwt.refresh_token_expiration(days);
        }

        let mut db = DbConfig::new(database_url);
        if let Some(max) = parse_opt(&lookup, "DB_MAX_CONNECTIONS")? {
            db = db.max_connections(max);
        }

        let mut session = SessionConfig::default();
        if let Some(ms) = parse_in(&lookup, "STORE_TIMEOUT_MS", STORE_TIMEOUT_MS)? {
            session = session.store_timeout(Duration::from_millis(ms));
        }
        if let Some(rotation) = parse_opt::<RotationPolicy>(&lookup, "REFRESH_ROTATION")? {
            session = session.rotation(rotation);
        }

        let addr = match parse_opt(&lookup, "APP_ADDR")? {
            Some(addr) => addr,
            None => DEFAULT_APP_ADDR.parse().map_err(|_| ConfigError::Invalid {
                key: "APP_ADDR",
                value: DEFAULT_APP_ADDR.to_string(),
            })?,
        };

        let bcrypt_cost = parse_opt(&lookup, "BCRYPT_COST")?.unwrap_or(DEFAULT_BCRYPT_COST);

        Ok(Self {
            addr,
            db,
            jwt,
            session,
            bcrypt_cost,
        })
    }
}

fn parse_opt<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Like `parse_opt`, but the value must also fall inside `range`
fn parse_in<T: FromStr + PartialOrd>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    range: RangeInclusive<T>,
) -> Result<Option<T>, ConfigError> {
    match parse_opt::<T>(lookup, key)? {
        Some(value) if !range.contains(&value) => Err(ConfigError::Invalid {
            key,
            value: lookup(key).unwrap_or_default(),
        }),
        other => Ok(other),
    }
}

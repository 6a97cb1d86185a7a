//! Core of tokenwarden: configuration, persistence and the auth layer

pub mod auth;
pub mod config;
pub mod db;
#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};

//! tokenwarden - credential and session-token authority
//!
//! Registers users, authenticates them with email and password, and issues
//! short-lived access tokens plus rotating refresh tokens.

pub mod core;

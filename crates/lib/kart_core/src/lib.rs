//! # kart_core
//!
//! Core user and credential logic for Kart: the persisted user record,
//! bcrypt password hashing, JWT access/refresh token issuance, and the
//! user service that routes every write through those primitives.

pub mod auth;
pub mod config;
pub mod models;
pub mod users;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

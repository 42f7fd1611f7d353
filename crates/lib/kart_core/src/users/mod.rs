//! User persistence and account operations.
//!
//! [`UserService`] is the only writer of user records. It normalizes and
//! validates input, hashes passwords before they reach a [`UserStore`], and
//! issues tokens.

pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;
pub mod validation;

use std::fmt;

use thiserror::Error;

use crate::auth::AuthError;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use service::UserService;
pub use store::UserStore;

/// User fields that validation can complain about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Email,
    FullName,
    Password,
    Avatar,
    Phone,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Username => "username",
            Field::Email => "email",
            Field::FullName => "fullName",
            Field::Password => "password",
            Field::Avatar => "avatar",
            Field::Phone => "phone",
        })
    }
}

/// Input problems the caller can fix.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(Field),

    #[error("{field} '{value}' is already taken")]
    Duplicate { field: Field, value: String },

    #[error("{field} is invalid: {reason}")]
    Malformed { field: Field, reason: String },
}

/// User service errors.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid one-time passcode")]
    OtpInvalid,

    #[error("One-time passcode expired")]
    OtpExpired,

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl UserError {
    /// Errors the end user can resolve by changing their input. Everything
    /// else is fatal to the operation and should be logged by the caller.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            UserError::Validation(_)
                | UserError::Auth(AuthError::CredentialError)
                | UserError::OtpInvalid
                | UserError::OtpExpired
        )
    }

    pub(crate) fn duplicate(field: Field, value: &str) -> Self {
        UserError::Validation(ValidationError::Duplicate {
            field,
            value: value.to_string(),
        })
    }
}

//! User domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{AddressId, OrderId, ProductId, UserId};

/// How an account proves ownership of its contact channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMethod {
    #[default]
    Email,
    Phone,
}

impl VerificationMethod {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Email => "email",
            VerificationMethod::Phone => "phone",
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown verification method '{0}'")]
pub struct ParseVerificationMethodError(String);

impl FromStr for VerificationMethod {
    type Err = ParseVerificationMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(VerificationMethod::Email),
            "phone" => Ok(VerificationMethod::Phone),
            _ => Err(ParseVerificationMethodError(s.to_string())),
        }
    }
}

/// A persisted account.
///
/// Serializes without `password_hash`, `otp`, `otp_expires`, or
/// `refresh_token`, so a `User` can be handed to callers as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub verification_method: VerificationMethod,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub shipping_address: Option<AddressId>,
    pub billing_address: Option<AddressId>,
    pub orders: Vec<OrderId>,
    pub wishlist: Vec<ProductId>,
    #[serde(skip)]
    pub otp: Option<u32>,
    #[serde(skip)]
    pub otp_expires: Option<DateTime<Utc>>,
    pub is_verified: bool,
    /// SHA-256 digest of the last-issued refresh token.
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether an OTP is pending and still inside its validity window.
    pub fn has_live_otp(&self, now: DateTime<Utc>) -> bool {
        matches!((self.otp, self.otp_expires), (Some(_), Some(expires)) if now < expires)
    }

    fn clear_otp(&mut self) {
        self.otp = None;
        self.otp_expires = None;
    }

    /// Record a successful OTP confirmation.
    pub(crate) fn mark_verified(&mut self) {
        self.is_verified = true;
        self.clear_otp();
    }

    /// Drop a pending OTP without verifying.
    pub(crate) fn discard_otp(&mut self) {
        self.clear_otp();
    }

    /// Copy the fields set in `update` onto this record.
    pub(crate) fn apply_profile(&mut self, update: &ProfileUpdate) {
        if let Some(full_name) = &update.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(method) = update.verification_method {
            self.verification_method = method;
        }
        if let Some(avatar) = &update.avatar {
            self.avatar = avatar.clone();
        }
        if let Some(phone) = &update.phone {
            self.phone = phone.clone();
        }
        if let Some(address) = update.shipping_address {
            self.shipping_address = address;
        }
        if let Some(address) = update.billing_address {
            self.billing_address = address;
        }
    }
}

/// Registration input. Holds the plaintext password until it is hashed.
#[derive(Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub verification_method: Option<VerificationMethod>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            full_name: full_name.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("password", &"<redacted>")
            .field("verification_method", &self.verification_method)
            .field("avatar", &self.avatar)
            .field("phone", &self.phone)
            .finish()
    }
}

/// Partial profile update. `None` leaves a field alone; `Some(None)` clears
/// an optional field.
///
/// There is no password field: password changes go through
/// `UserService::set_password`.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub verification_method: Option<VerificationMethod>,
    pub avatar: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub shipping_address: Option<Option<AddressId>>,
    pub billing_address: Option<Option<AddressId>>,
}

//! User storage trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::UserError;
use crate::models::ids::{OrderId, ProductId, UserId};
use crate::models::user::{ProfileUpdate, User};

/// Persistence for user records.
///
/// Implementations enforce username/email uniqueness atomically and report
/// violations as `ValidationError::Duplicate`. Lookups take already
/// normalized keys.
///
/// There is no whole-record save. Each write touches only its own columns
/// in a single atomic step, so concurrent operations on one user never
/// overwrite each other. The password hash only changes through `insert`
/// and `update_password_hash`. Every write stamps `updated_at` and fails
/// with `UserError::NotFound` for a missing record.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new record. Fails on a duplicate username or email.
    async fn insert(&self, user: &User) -> Result<User, UserError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError>;

    /// Apply an already-normalized profile update.
    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User, UserError>;

    /// Replace the stored password hash.
    async fn update_password_hash(&self, id: UserId, password_hash: &str) -> Result<(), UserError>;

    /// Store (or with `None`, clear) the refresh-token digest.
    async fn set_refresh_token(&self, id: UserId, digest: Option<&str>) -> Result<(), UserError>;

    /// Swap the refresh-token digest from `current` to `next`. Returns
    /// `false` and changes nothing when the stored digest is not `current`.
    async fn rotate_refresh_token(
        &self,
        id: UserId,
        current: &str,
        next: &str,
    ) -> Result<bool, UserError>;

    /// Store a pending OTP, replacing any previous one.
    async fn set_otp(&self, id: UserId, code: u32, expires: DateTime<Utc>)
    -> Result<(), UserError>;

    /// Drop the pending OTP if it is still `code`.
    async fn discard_otp(&self, id: UserId, code: u32) -> Result<(), UserError>;

    /// Mark the account verified and consume the OTP, provided `code` is
    /// pending and unexpired at `now`. Returns `None` otherwise.
    async fn confirm_otp(
        &self,
        id: UserId,
        code: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserError>;

    /// Append a product to the wishlist unless it is already there.
    async fn add_to_wishlist(&self, id: UserId, product: ProductId) -> Result<User, UserError>;

    async fn remove_from_wishlist(&self, id: UserId, product: ProductId)
    -> Result<User, UserError>;

    /// Append an order unless it is already recorded.
    async fn add_order(&self, id: UserId, order: OrderId) -> Result<User, UserError>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: UserId) -> Result<bool, UserError>;
}

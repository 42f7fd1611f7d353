//! Account operations: registration, credentials, tokens, OTP, and
//! order/wishlist bookkeeping.
//!
//! Passwords are hashed here, before any store call, and only through
//! [`register`](UserService::register) and
//! [`set_password`](UserService::set_password). Every other write is a
//! narrow [`UserStore`] operation that touches only its own columns, so
//! overlapping calls for the same user do not lose each other's changes.

use chrono::{Duration, Utc};
use rand::{Rng, rng};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::store::UserStore;
use super::validation::{
    normalize_avatar, normalize_email, normalize_full_name, normalize_phone, normalize_username,
    validate_password,
};
use super::UserError;
use crate::auth::AuthError;
use crate::auth::jwt::{TokenIssuer, TokenPair, token_digest};
use crate::auth::password::{hash_password_async, verify_password_async};
use crate::config::KartConfig;
use crate::models::ids::{OrderId, ProductId, UserId};
use crate::models::user::{NewUser, ProfileUpdate, User};

/// Smallest six-digit passcode.
const OTP_MIN: u32 = 100_000;

/// One past the largest six-digit passcode.
const OTP_MAX: u32 = 1_000_000;

/// Checked against when the login names no account, so both failure paths
/// cost one bcrypt verification.
const DUMMY_PASSWORD: &str = "kart-unknown-account";

/// User account service over a [`UserStore`].
pub struct UserService<S> {
    store: S,
    issuer: TokenIssuer,
    otp_expiry: Duration,
    dummy_hash: OnceCell<String>,
}

impl<S: UserStore> UserService<S> {
    pub fn new(store: S, config: &KartConfig) -> Self {
        Self {
            store,
            issuer: TokenIssuer::new(&config.tokens),
            otp_expiry: config.otp_expiry,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Fetch a user by ID.
    pub async fn get(&self, id: UserId) -> Result<User, UserError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| UserError::NotFound(format!("user {id}")))
    }

    /// Look a user up by username, or by email when `login` contains `@`.
    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>, UserError> {
        let login = login.trim().to_lowercase();
        if login.contains('@') {
            self.store.find_by_email(&login).await
        } else {
            self.store.find_by_username(&login).await
        }
    }

    /// Register a new account. The password is hashed before the insert; a
    /// failure at any step leaves nothing behind.
    pub async fn register(&self, new: NewUser) -> Result<User, UserError> {
        let username = normalize_username(&new.username)?;
        let email = normalize_email(&new.email)?;
        let full_name = normalize_full_name(&new.full_name)?;
        let avatar = normalize_avatar(new.avatar.as_deref())?;
        let phone = normalize_phone(new.phone.as_deref())?;
        validate_password(&new.password)?;

        let password_hash = hash_password_async(new.password).await?;

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            username,
            verification_method: new.verification_method.unwrap_or_default(),
            email,
            full_name,
            avatar,
            password_hash,
            phone,
            shipping_address: None,
            billing_address: None,
            orders: Vec::new(),
            wishlist: Vec::new(),
            otp: None,
            otp_expires: None,
            is_verified: false,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };

        let user = self.store.insert(&user).await?;
        info!(user_id = %user.id, username = %user.username, "registered user");
        Ok(user)
    }

    /// Check a username-or-email and password. Unknown accounts and wrong
    /// passwords produce the same error and both run a bcrypt verification.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User, UserError> {
        let Some(user) = self.find_by_login(login).await? else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| hash_password_async(DUMMY_PASSWORD.to_string()))
                .await?;
            verify_password_async(password.to_string(), dummy.clone()).await?;
            warn!("authentication failed: unknown account");
            return Err(AuthError::CredentialError.into());
        };

        if !verify_password_async(password.to_string(), user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "authentication failed: wrong password");
            return Err(AuthError::CredentialError.into());
        }
        Ok(user)
    }

    /// Replace a user's password. Hashes immediately; only the hash is
    /// written.
    pub async fn set_password(&self, id: UserId, password: &str) -> Result<(), UserError> {
        validate_password(password)?;
        let password_hash = hash_password_async(password.to_string()).await?;
        self.store.update_password_hash(id, &password_hash).await?;
        info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Apply a profile update. Never touches the password hash.
    pub async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User, UserError> {
        let update = ProfileUpdate {
            full_name: update.full_name.as_deref().map(normalize_full_name).transpose()?,
            verification_method: update.verification_method,
            avatar: update
                .avatar
                .map(|avatar| normalize_avatar(avatar.as_deref()))
                .transpose()?,
            phone: update
                .phone
                .map(|phone| normalize_phone(phone.as_deref()))
                .transpose()?,
            shipping_address: update.shipping_address,
            billing_address: update.billing_address,
        };
        self.store.update_profile(id, &update).await
    }

    /// Issue an access/refresh pair and remember the refresh token's digest.
    pub async fn issue_tokens(&self, id: UserId) -> Result<TokenPair, UserError> {
        let user = self.get(id).await?;
        let pair = self.issuer.issue_pair(&user)?;
        self.store
            .set_refresh_token(id, Some(&token_digest(&pair.refresh_token)))
            .await?;
        info!(user_id = %id, "issued token pair");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The presented token must be
    /// the last one issued to the user; it is swapped for the new one in a
    /// single step, so a token can be redeemed at most once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, UserError> {
        let claims = self.issuer.verify_refresh_token(refresh_token)?;
        let id: UserId = claims
            .id
            .parse()
            .map_err(|_| AuthError::Token("malformed subject".into()))?;

        let user = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::Token("unknown subject".into()))?;

        let current = token_digest(refresh_token);
        let revoked = || {
            warn!(user_id = %id, "refresh token does not match the stored one");
            UserError::from(AuthError::Token("refresh token revoked".into()))
        };
        if user.refresh_token.as_deref() != Some(current.as_str()) {
            return Err(revoked());
        }

        let pair = self.issuer.issue_pair(&user)?;
        let next = token_digest(&pair.refresh_token);
        if !self.store.rotate_refresh_token(id, &current, &next).await? {
            return Err(revoked());
        }
        info!(user_id = %id, "rotated refresh token");
        Ok(pair)
    }

    /// Forget the stored refresh token so it can no longer be exchanged.
    pub async fn logout(&self, id: UserId) -> Result<(), UserError> {
        self.store.set_refresh_token(id, None).await
    }

    /// Generate and store a six-digit OTP. Delivering it is the caller's job.
    pub async fn issue_otp(&self, id: UserId) -> Result<u32, UserError> {
        let code = rng().random_range(OTP_MIN..OTP_MAX);
        self.store
            .set_otp(id, code, Utc::now() + self.otp_expiry)
            .await?;
        info!(user_id = %id, "issued otp");
        Ok(code)
    }

    /// Confirm an OTP. On success the account becomes verified and the OTP
    /// is consumed; an expired OTP is discarded. A mismatch leaves the OTP
    /// pending.
    ///
    /// There is no attempt limit: a six-digit code can be brute-forced
    /// within its lifetime, so callers exposing this must rate-limit it.
    pub async fn verify_otp(&self, id: UserId, code: u32) -> Result<User, UserError> {
        let user = self.get(id).await?;
        let now = Utc::now();

        let Some(pending) = user.otp else {
            return Err(UserError::OtpInvalid);
        };
        if !user.has_live_otp(now) {
            self.store.discard_otp(id, pending).await?;
            return Err(UserError::OtpExpired);
        }
        if pending != code {
            warn!(user_id = %id, "otp mismatch");
            return Err(UserError::OtpInvalid);
        }

        // The OTP may have been replaced or consumed since the read.
        let user = self
            .store
            .confirm_otp(id, code, now)
            .await?
            .ok_or(UserError::OtpInvalid)?;
        info!(user_id = %id, "account verified");
        Ok(user)
    }

    /// Append a product to the wishlist. Already-present products are kept
    /// in their original position.
    pub async fn add_to_wishlist(&self, id: UserId, product: ProductId) -> Result<User, UserError> {
        self.store.add_to_wishlist(id, product).await
    }

    pub async fn remove_from_wishlist(
        &self,
        id: UserId,
        product: ProductId,
    ) -> Result<User, UserError> {
        self.store.remove_from_wishlist(id, product).await
    }

    /// Append an order to the user's history.
    pub async fn record_order(&self, id: UserId, order: OrderId) -> Result<User, UserError> {
        self.store.add_order(id, order).await
    }

    /// Delete an account. Orders and wishlist entries are left to their
    /// owning subsystems.
    pub async fn delete(&self, id: UserId) -> Result<(), UserError> {
        if !self.store.delete(id).await? {
            return Err(UserError::NotFound(format!("user {id}")));
        }
        info!(user_id = %id, "deleted user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::users::MemoryUserStore;

    fn service() -> UserService<MemoryUserStore> {
        let config = KartConfig {
            tokens: TokenConfig::new("access-secret", "refresh-secret").unwrap(),
            otp_expiry: Duration::minutes(10),
        };
        UserService::new(MemoryUserStore::new(), &config)
    }

    #[tokio::test]
    async fn expired_otp_is_discarded() {
        let svc = service();
        let user = svc
            .register(NewUser::new("otpuser", "otp@example.com", "Otp User", "password123"))
            .await
            .unwrap();
        let code = svc.issue_otp(user.id).await.unwrap();

        // Backdate the expiry directly in the store.
        svc.store()
            .set_otp(user.id, code, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(matches!(svc.verify_otp(user.id, code).await, Err(UserError::OtpExpired)));
        let after = svc.get(user.id).await.unwrap();
        assert_eq!(after.otp, None);
        assert!(!after.is_verified);
    }

    #[tokio::test]
    async fn unknown_login_still_runs_bcrypt() {
        let svc = service();
        assert!(svc.dummy_hash.get().is_none());

        let err = svc.authenticate("nobody", "password123").await.unwrap_err();
        assert!(matches!(err, UserError::Auth(AuthError::CredentialError)));

        let dummy = svc.dummy_hash.get().expect("dummy hash computed");
        assert!(dummy.starts_with("$2b$10$"));
        assert!(!verify_password_async("password123".into(), dummy.clone()).await.unwrap());
    }

    #[tokio::test]
    async fn otp_is_six_digits() {
        let svc = service();
        let user = svc
            .register(NewUser::new("digits", "digits@example.com", "D", "password123"))
            .await
            .unwrap();
        for _ in 0..20 {
            let code = svc.issue_otp(user.id).await.unwrap();
            assert!((OTP_MIN..OTP_MAX).contains(&code));
        }
    }
}

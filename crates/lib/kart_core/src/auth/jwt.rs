//! JWT token generation and verification.
//!
//! Access tokens carry only the user ID; refresh tokens also carry email,
//! username, and full name. Both are HS256 with separate secrets.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::AuthError;
use crate::config::TokenConfig;
use crate::models::user::User;

/// Claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID.
    #[serde(rename = "_id")]
    pub id: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Claims embedded in refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User ID.
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Signs and verifies both token kinds.
#[derive(Clone)]
pub struct TokenIssuer {
    access_expiry: Duration,
    refresh_expiry: Duration,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access_expiry: config.access_expiry,
            refresh_expiry: config.refresh_expiry,
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
        }
    }

    pub fn access_expiry(&self) -> Duration {
        self.access_expiry
    }

    pub fn refresh_expiry(&self) -> Duration {
        self.refresh_expiry
    }

    /// Sign an access token for `user`.
    pub fn issue_access_token(&self, user: &User) -> Result<String, AuthError> {
        self.issue_access_token_at(user, Utc::now())
    }

    fn issue_access_token_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = AccessClaims {
            id: user.id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_expiry).timestamp(),
        };
        sign(&claims, &self.access_encoding)
    }

    /// Sign a refresh token for `user`.
    pub fn issue_refresh_token(&self, user: &User) -> Result<String, AuthError> {
        self.issue_refresh_token_at(user, Utc::now())
    }

    fn issue_refresh_token_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = RefreshClaims {
            id: user.id.to_string(),
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat: now.timestamp(),
            exp: (now + self.refresh_expiry).timestamp(),
        };
        sign(&claims, &self.refresh_encoding)
    }

    /// Issue both tokens at the same instant.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.issue_access_token_at(user, now)?,
            refresh_token: self.issue_refresh_token_at(user, now)?,
            expires_in: self.access_expiry.num_seconds(),
        })
    }

    /// Verify an access token's signature and expiry.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        verify(token, &self.access_decoding)
    }

    /// Verify a refresh token's signature and expiry.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        verify(token, &self.refresh_decoding)
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::Signing(format!("jwt encode: {e}")))
}

fn verify<T: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::Token(format!("jwt decode: {e}")))
}

/// SHA-256 hex digest of a token, for storage.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::UserId;
    use crate::models::user::VerificationMethod;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&TokenConfig::new("access-secret", "refresh-secret").unwrap())
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            username: "testuser".into(),
            verification_method: VerificationMethod::Email,
            email: "test@example.com".into(),
            full_name: "Test User".into(),
            avatar: None,
            password_hash: String::new(),
            phone: None,
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
        }
    }

    /// Decode a token's payload segment without verifying it.
    fn raw_payload(token: &str) -> serde_json::Value {
        use base64::Engine;
        let payload = token.split('.').nth(1).unwrap();
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn access_token_carries_only_the_id() {
        let issuer = issuer();
        let user = user();
        let before = Utc::now().timestamp();
        let token = issuer.issue_access_token(&user).unwrap();

        let claims = issuer.verify_access_token(&token).unwrap();
        assert_eq!(claims.id, user.id.to_string());
        let expected = before + Duration::days(1).num_seconds();
        assert!((claims.exp - expected).abs() <= 2, "exp {} vs {expected}", claims.exp);

        let payload = raw_payload(&token);
        let mut keys: Vec<_> = payload.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["_id", "exp", "iat"]);
    }

    #[test]
    fn refresh_token_carries_profile_claims() {
        let issuer = issuer();
        let user = user();
        let before = Utc::now().timestamp();
        let token = issuer.issue_refresh_token(&user).unwrap();

        let claims = issuer.verify_refresh_token(&token).unwrap();
        assert_eq!(claims.id, user.id.to_string());
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.username, "testuser");
        assert_eq!(claims.full_name, "Test User");
        let expected = before + Duration::days(7).num_seconds();
        assert!((claims.exp - expected).abs() <= 2, "exp {} vs {expected}", claims.exp);

        let payload = raw_payload(&token);
        assert_eq!(payload["fullName"], "Test User");
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let issuer = issuer();
        let user = user();
        let access = issuer.issue_access_token(&user).unwrap();
        let refresh = issuer.issue_refresh_token(&user).unwrap();
        assert!(issuer.verify_refresh_token(&access).is_err());
        assert!(issuer.verify_access_token(&refresh).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issuer().issue_access_token(&user()).unwrap();
        let other = TokenIssuer::new(&TokenConfig::new("other", "other-r").unwrap());
        let err = other.verify_access_token(&token).unwrap_err();
        assert!(matches!(err, AuthError::Token(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            id: UserId::new().to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = sign(&claims, &EncodingKey::from_secret(b"access-secret")).unwrap();
        assert!(issuer().verify_access_token(&token).is_err());
    }

    #[test]
    fn configured_lifetimes_are_used() {
        let config = TokenConfig::new("a", "r")
            .unwrap()
            .with_expiry(Duration::minutes(15), Duration::days(30))
            .unwrap();
        let issuer = TokenIssuer::new(&config);
        let pair = issuer.issue_pair(&user()).unwrap();
        assert_eq!(pair.expires_in, 15 * 60);

        let access = issuer.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(access.exp - access.iat, 15 * 60);
        let refresh = issuer.verify_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.exp - refresh.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn digest_is_stable_hex() {
        let a = token_digest("token");
        assert_eq!(a, token_digest("token"));
        assert_ne!(a, token_digest("token2"));
        assert_eq!(a.len(), 64);
    }
}

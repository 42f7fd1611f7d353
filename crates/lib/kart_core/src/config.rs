//! Token and OTP configuration.
//!
//! Secrets and lifetimes come from the environment; nothing is hardcoded at
//! call sites. An absent or empty secret is rejected here so a misconfigured
//! process fails at startup instead of issuing tokens signed with "".

use std::fmt;

use chrono::Duration;

use crate::auth::AuthError;

/// Default access token lifetime: 1 day.
pub const DEFAULT_ACCESS_EXPIRY: &str = "1d";

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_EXPIRY: &str = "7d";

/// Default OTP lifetime: 10 minutes.
pub const DEFAULT_OTP_EXPIRY: &str = "10m";

/// Signing secrets and lifetimes for the two token kinds.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_expiry: Duration,
    pub refresh_secret: String,
    pub refresh_expiry: Duration,
}

impl TokenConfig {
    /// Build a config with the default lifetimes (1 day / 7 days).
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let config = Self {
            access_secret: access_secret.into(),
            access_expiry: Duration::days(1),
            refresh_secret: refresh_secret.into(),
            refresh_expiry: Duration::days(7),
        };
        config.validate()?;
        Ok(config)
    }

    /// Override both lifetimes.
    pub fn with_expiry(mut self, access: Duration, refresh: Duration) -> Result<Self, AuthError> {
        self.access_expiry = access;
        self.refresh_expiry = refresh;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.access_secret.trim().is_empty() {
            return Err(AuthError::Config("access token secret is empty".into()));
        }
        if self.refresh_secret.trim().is_empty() {
            return Err(AuthError::Config("refresh token secret is empty".into()));
        }
        if self.access_expiry <= Duration::zero() || self.refresh_expiry <= Duration::zero() {
            return Err(AuthError::Config("token lifetimes must be positive".into()));
        }
        Ok(())
    }
}

// Secrets never reach logs.
impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("access_expiry", &self.access_expiry)
            .field("refresh_secret", &"<redacted>")
            .field("refresh_expiry", &self.refresh_expiry)
            .finish()
    }
}

/// Everything the user service needs from the environment.
#[derive(Clone, Debug)]
pub struct KartConfig {
    pub tokens: TokenConfig,
    pub otp_expiry: Duration,
}

impl KartConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable               | Default  |
    /// |------------------------|----------|
    /// | `ACCESS_TOKEN_SECRET`  | required |
    /// | `ACCESS_TOKEN_EXPIRY`  | `1d`     |
    /// | `REFRESH_TOKEN_SECRET` | required |
    /// | `REFRESH_TOKEN_EXPIRY` | `7d`     |
    /// | `OTP_EXPIRY`           | `10m`    |
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::Config(format!("{key} is not set")))
        };
        let expiry = |key: &str, default: &str| {
            let raw = lookup(key).unwrap_or_else(|| default.to_string());
            parse_expiry(&raw).map_err(|e| AuthError::Config(format!("{key}: {e}")))
        };

        let tokens = TokenConfig::new(
            required("ACCESS_TOKEN_SECRET")?,
            required("REFRESH_TOKEN_SECRET")?,
        )?
        .with_expiry(
            expiry("ACCESS_TOKEN_EXPIRY", DEFAULT_ACCESS_EXPIRY)?,
            expiry("REFRESH_TOKEN_EXPIRY", DEFAULT_REFRESH_EXPIRY)?,
        )?;

        let otp_expiry = expiry("OTP_EXPIRY", DEFAULT_OTP_EXPIRY)?;
        if otp_expiry <= Duration::zero() {
            return Err(AuthError::Config("OTP_EXPIRY must be positive".into()));
        }

        Ok(Self { tokens, otp_expiry })
    }
}

/// Parse a lifetime such as `30s`, `15m`, `12h`, `7d`, or bare seconds.
pub fn parse_expiry(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let n: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{raw}'"))?;
    let duration = match unit.trim() {
        "" | "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        other => return Err(format!("unknown duration unit '{other}' in '{raw}'")),
    };
    duration.ok_or_else(|| format!("duration '{raw}' out of range"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_expiry_units() {
        assert_eq!(parse_expiry("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_expiry("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_expiry("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_expiry("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_expiry("3600").unwrap(), Duration::hours(1));
    }

    #[test]
    fn parse_expiry_rejects_garbage() {
        assert!(parse_expiry("").is_err());
        assert!(parse_expiry("d").is_err());
        assert!(parse_expiry("5w").is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = KartConfig::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "a"),
            ("REFRESH_TOKEN_SECRET", "r"),
        ]))
        .unwrap();
        assert_eq!(cfg.tokens.access_expiry, Duration::days(1));
        assert_eq!(cfg.tokens.refresh_expiry, Duration::days(7));
        assert_eq!(cfg.otp_expiry, Duration::minutes(10));
    }

    #[test]
    fn overrides_apply() {
        let cfg = KartConfig::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "a"),
            ("ACCESS_TOKEN_EXPIRY", "15m"),
            ("REFRESH_TOKEN_SECRET", "r"),
            ("REFRESH_TOKEN_EXPIRY", "30d"),
            ("OTP_EXPIRY", "5m"),
        ]))
        .unwrap();
        assert_eq!(cfg.tokens.access_expiry, Duration::minutes(15));
        assert_eq!(cfg.tokens.refresh_expiry, Duration::days(30));
        assert_eq!(cfg.otp_expiry, Duration::minutes(5));
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let err = KartConfig::from_lookup(lookup(&[("ACCESS_TOKEN_SECRET", "a")])).unwrap_err();
        assert!(matches!(err, AuthError::Config(ref m) if m.contains("REFRESH_TOKEN_SECRET")));
    }

    #[test]
    fn blank_secret_is_a_config_error() {
        let err = KartConfig::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "   "),
            ("REFRESH_TOKEN_SECRET", "r"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
        assert!(TokenConfig::new("", "r").is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = TokenConfig::new("top-secret-a", "top-secret-r").unwrap();
        let out = format!("{cfg:?}");
        assert!(!out.contains("top-secret"));
    }
}

//! Field normalization and validation.
//!
//! Usernames and emails are trimmed and lowercased before any lookup or
//! write, so uniqueness is checked on the normalized form.

use url::Url;

use super::{Field, ValidationError};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt only reads the first 72 bytes; longer inputs are rejected rather
/// than silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

fn required(field: Field, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(trimmed.to_string())
}

fn malformed(field: Field, reason: impl Into<String>) -> ValidationError {
    ValidationError::Malformed {
        field,
        reason: reason.into(),
    }
}

/// Trim and lowercase a username.
pub fn normalize_username(raw: &str) -> Result<String, ValidationError> {
    required(Field::Username, raw).map(|s| s.to_lowercase())
}

/// Trim, lowercase, and sanity-check an email address.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = required(Field::Email, raw)?.to_lowercase();

    if email.chars().any(char::is_whitespace) {
        return Err(malformed(Field::Email, "must not contain whitespace"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(malformed(Field::Email, "missing '@'"));
    };
    if local.is_empty() || domain.contains('@') {
        return Err(malformed(Field::Email, "expected exactly one '@'"));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(malformed(Field::Email, "invalid domain"));
    }
    Ok(email)
}

/// Trim a full name.
pub fn normalize_full_name(raw: &str) -> Result<String, ValidationError> {
    required(Field::FullName, raw)
}

/// Check a plaintext password before hashing.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required(Field::Password));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(malformed(
            Field::Password,
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(malformed(
            Field::Password,
            format!("must be at most {MAX_PASSWORD_BYTES} bytes"),
        ));
    }
    Ok(())
}

/// Avatars are absolute http(s) URLs. Blank input clears the field.
pub fn normalize_avatar(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let url = Url::parse(raw).map_err(|e| malformed(Field::Avatar, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url.to_string())),
        other => Err(malformed(Field::Avatar, format!("unsupported scheme '{other}'"))),
    }
}

/// Phone numbers are free-form but limited to dialable characters. Blank
/// input clears the field.
pub fn normalize_phone(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let dialable = raw
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if !dialable || !raw.chars().any(|c| c.is_ascii_digit()) {
        return Err(malformed(Field::Phone, "must contain only digits, spaces, and + - ( )"));
    }
    Ok(Some(raw.to_string()))
}

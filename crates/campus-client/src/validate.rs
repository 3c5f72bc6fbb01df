//! Form validation shared by every command that sends user input.
//!
//! Each check returns the first problem as a [`ValidationError`] naming the
//! offending field. Nothing here touches the network.

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum length of a document name.
pub const MAX_DOCUMENT_NAME_LEN: usize = 50;

/// Regex for email addresses: something `@` something `.` something, no
/// whitespace.
#[allow(clippy::expect_used)]
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Regex for phone numbers: exactly ten digits.
#[allow(clippy::expect_used)]
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{10}$").expect("valid phone regex"));

/// Input rejected before any request was sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field}: {message}")]
pub struct ValidationError {
    /// Name of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result of a single check.
pub type Check = std::result::Result<(), ValidationError>;

/// Returns `true` if `value` looks like an email address.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Returns `true` if `value` is exactly ten digits.
#[must_use]
pub fn is_valid_phone(value: &str) -> bool {
    PHONE_RE.is_match(value)
}

/// Fails if `value` is empty after trimming.
///
/// # Errors
///
/// Returns a `ValidationError` for `field` when the value is blank.
pub fn required(field: &str, value: &str) -> Check {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Ok(())
}

/// Fails if `value` is blank or not an email address.
///
/// # Errors
///
/// Returns a `ValidationError` for `field` when the check fails.
pub fn email(field: &str, value: &str) -> Check {
    required(field, value)?;
    if !is_valid_email(value.trim()) {
        return Err(ValidationError::new(
            field,
            "must be a valid email address such as example@domain.com",
        ));
    }
    Ok(())
}

/// Fails if `value` is blank or not a ten-digit phone number.
///
/// # Errors
///
/// Returns a `ValidationError` for `field` when the check fails.
pub fn phone(field: &str, value: &str) -> Check {
    required(field, value)?;
    if !is_valid_phone(value.trim()) {
        return Err(ValidationError::new(field, "must be exactly 10 digits"));
    }
    Ok(())
}

/// Fails if `value` is shorter than [`MIN_PASSWORD_LEN`] characters.
///
/// # Errors
///
/// Returns a `ValidationError` for `field` when the check fails.
pub fn password(field: &str, value: &str) -> Check {
    required(field, value)?;
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

/// Fails if the confirmation is blank or differs from the password.
///
/// # Errors
///
/// Returns a `ValidationError` for `field` when the check fails.
pub fn confirmation(field: &str, password: &str, confirm: &str) -> Check {
    required(field, confirm)?;
    if password != confirm {
        return Err(ValidationError::new(field, "does not match the password"));
    }
    Ok(())
}

/// Fails if `value` is longer than `max` characters.
///
/// # Errors
///
/// Returns a `ValidationError` for `field` when the check fails.
pub fn max_length(field: &str, value: &str, max: usize) -> Check {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

/// Validates a new password and its confirmation together.
///
/// # Errors
///
/// Returns the first failing check.
pub fn new_password(password_value: &str, confirm: &str) -> Check {
    password("password", password_value)?;
    confirmation("confirm_password", password_value, confirm)
}

use crate::errors::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(&email.trim().to_lowercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(())
    }
}

/// Every value non-blank, else [`ValidationError::MissingFields`].
pub fn require_all(values: &[&str]) -> Result<(), ValidationError> {
    if values.iter().any(|v| v.trim().is_empty()) {
        Err(ValidationError::MissingFields)
    } else {
        Ok(())
    }
}

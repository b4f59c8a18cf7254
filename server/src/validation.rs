//! Input validation for account registration.
//!
//! Rules are checked in a fixed order and the first failure is reported, so
//! a client fixing one field at a time always sees the next problem.

use thiserror::Error;

use crate::types::RegisterRequest;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Minimum full name length in characters.
pub const MIN_FULL_NAME_LEN: usize = 2;

/// Accepted phone number length after stripping separators.
pub const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 10..=15;

/// Registration input rejected before reaching the identity provider.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("email is required")]
    EmailRequired,
    #[error("invalid email format")]
    InvalidEmail,
    #[error("password is required")]
    PasswordRequired,
    #[error("password must be at least 8 characters")]
    PasswordTooShort,
    #[error("password must contain uppercase, lowercase, and number")]
    WeakPassword,
    #[error("full name is required")]
    FullNameRequired,
    #[error("full name must be at least 2 characters")]
    FullNameTooShort,
    #[error("phone number is required")]
    PhoneRequired,
    #[error("invalid phone number format")]
    InvalidPhone,
}

/// Validates a registration request, returning the first failing rule.
///
/// # Example
///
/// ```rust
/// use goticket_server::types::RegisterRequest;
/// use goticket_server::validation::{validate_registration, ValidationError};
///
/// let req = RegisterRequest {
///     email: "ada@example.com".into(),
///     password: "Secret123".into(),
///     full_name: "Ada Lovelace".into(),
///     phone_number: "+1 (555) 123-4567".into(),
///     username: "ada".into(),
/// };
/// assert_eq!(validate_registration(&req), Ok(()));
///
/// let req = RegisterRequest { password: "short".into(), ..req };
/// assert_eq!(validate_registration(&req), Err(ValidationError::PasswordTooShort));
/// ```
pub fn validate_registration(req: &RegisterRequest) -> Result<(), ValidationError> {
    if req.email.is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if !is_valid_email(&req.email) {
        return Err(ValidationError::InvalidEmail);
    }

    if req.password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if !is_strong_password(&req.password) {
        return Err(ValidationError::WeakPassword);
    }

    if req.full_name.is_empty() {
        return Err(ValidationError::FullNameRequired);
    }
    if req.full_name.chars().count() < MIN_FULL_NAME_LEN {
        return Err(ValidationError::FullNameTooShort);
    }

    if req.phone_number.is_empty() {
        return Err(ValidationError::PhoneRequired);
    }
    if !is_valid_phone(&req.phone_number) {
        return Err(ValidationError::InvalidPhone);
    }

    Ok(())
}

/// Loose email check: an `@` and a `.` somewhere.
pub fn is_valid_email(email: &str) -> bool {
    email.contains('@') && email.contains('.')
}

/// Requires at least one ASCII uppercase letter, lowercase letter and digit.
pub fn is_strong_password(password: &str) -> bool {
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    has_upper && has_lower && has_digit
}

/// Strips spaces, dashes, parentheses and `+`, then checks the length.
pub fn is_valid_phone(phone: &str) -> bool {
    let cleaned = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .count();
    PHONE_DIGITS.contains(&cleaned)
}

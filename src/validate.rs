//! Record input validation.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::model::RecordInput;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9\-+()\s]+$").expect("valid regex"));

/// Why a record was rejected. Displayed to the user verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field '{0}' is required")]
    MissingField(&'static str),

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Invalid phone format")]
    InvalidPhone,
}

/// Checks required fields and the email/phone formats.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_record(input: &RecordInput) -> Result<(), ValidationError> {
    if input.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    let email = input.email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingField("email"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }
    if let Some(phone) = input.phone.as_deref().map(str::trim)
        && !phone.is_empty()
        && !PHONE_RE.is_match(phone)
    {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(())
}

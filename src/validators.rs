/// Input validators for account and role payloads
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Strict email format
/// 3. Names and phone numbers free of control characters
/// 4. Normalization used for case-insensitive lookups

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 256;
const MAX_ROLE_NAME_LENGTH: usize = 256;
const MAX_PHONE_LENGTH: usize = 32;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();

    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9 ()-]{4,}$").unwrap();
}

/// Upper-cases an email or role name for unique, case-insensitive lookups
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Validates an email address, returning it trimmed
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    // local part longer than 64 octets is not deliverable
    if let Some(at_pos) = trimmed.find('@') {
        if at_pos > 64 {
            return Err(ValidationError::SuspiciousContent("email".to_string()));
        }
    }

    Ok(trimmed.to_string())
}

/// Validates a person name (`field` is the JSON key it came from)
pub fn is_valid_name(name: &str, field: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_NAME_LENGTH));
    }

    if has_suspicious_name_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates an optional phone number; blank input becomes `None`
pub fn is_valid_phone(phone: Option<&str>) -> Result<Option<String>, ValidationError> {
    let trimmed = match phone.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(p) => p,
    };

    if trimmed.len() > MAX_PHONE_LENGTH {
        return Err(ValidationError::TooLong("phoneNumber".to_string(), MAX_PHONE_LENGTH));
    }

    if !PHONE_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("phoneNumber".to_string()));
    }

    Ok(Some(trimmed.to_string()))
}

/// Validates a role name
pub fn is_valid_role_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }

    if trimmed.len() > MAX_ROLE_NAME_LENGTH {
        return Err(ValidationError::TooLong("name".to_string(), MAX_ROLE_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("name".to_string()));
    }

    Ok(trimmed.to_string())
}

fn has_suspicious_name_patterns(name: &str) -> bool {
    if name.chars().any(|c| c.is_control()) {
        return true;
    }

    let special_char_count = name
        .chars()
        .filter(|c| {
            !c.is_alphanumeric() && !c.is_whitespace() && !matches!(c, '-' | '.' | '_' | '\'')
        })
        .count();

    special_char_count > 5
}

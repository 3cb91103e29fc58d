/// Password Hashing and Verification
///
/// bcrypt hashing with a configurable work factor, plus the password policy
/// applied on registration and password change.

use bcrypt::{hash, verify};

use crate::configuration::PasswordSettings;
use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_PASSWORD_LENGTH: usize = 15;

/// Hash a password that already passed `validate_password_strength`
///
/// # Errors
/// Returns `Internal` if bcrypt fails (e.g. a cost outside 4..=31)
pub fn hash_password(password: &str, settings: &PasswordSettings) -> Result<String, AppError> {
    hash(password, settings.hash_cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns `Internal` if the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// `hash_password` on the blocking thread pool
pub async fn compute_password_hash(
    password: String,
    settings: PasswordSettings,
) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password, &settings))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// `verify_password` on the blocking thread pool
pub async fn verify_password_hash(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
}

/// Validate password policy
///
/// Requirements:
/// - 6 to 15 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
/// - At least one non-alphanumeric character
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length == 0 {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let mut missing = Vec::new();
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a digit");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        missing.push("a lowercase letter");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        missing.push("an uppercase letter");
    }
    if password.chars().all(|c| c.is_alphanumeric()) {
        missing.push("a non-alphanumeric character");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::PasswordPolicy(missing))
    }
}

/// Bearer Token Issuing and Validation
///
/// Tokens are stateless HS256 JWTs; expiry is their only lifetime bound.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Mint a bearer token for an authenticated account
///
/// # Arguments
/// * `account_id` - Account UUID
/// * `name` - User name carried in the `name` claim
/// * `roles` - Current role names of the account
/// * `config` - JWT configuration settings
///
/// # Errors
/// Returns `Internal` if signing fails
pub fn generate_access_token(
    account_id: &Uuid,
    name: &str,
    roles: &[String],
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = Claims::new(
        *account_id,
        name.to_string(),
        roles.to_vec(),
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate and extract claims from a bearer token
///
/// # Errors
/// `TokenExpired` for an expired token, `TokenInvalid` for anything else
/// (bad signature, wrong issuer, malformed)
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("JWT validation error: {}", e);
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Auth(AuthError::TokenExpired),
            _ => AppError::Auth(AuthError::TokenInvalid),
        }
    })
}

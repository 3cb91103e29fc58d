/// Refresh Token Management
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - One per account; issuing a new token replaces the previous one
/// - Bound to the account's security version at issue time, so rotating the
///   version invalidates them without enumerating them

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::store::{Account, IdentityStore, RefreshTokenRecord};
use crate::validators::normalize;

const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new cryptographically secure refresh token
///
/// The token is returned in plaintext (this is what the client stores).
/// The server stores only the SHA-256 hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compares two digests without short-circuiting on the first differing byte
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Issue a refresh token for an account
///
/// Replaces any token previously stored for the account. The token lives
/// `refresh_token_expiry` seconds and is bound to the account's current
/// security version.
///
/// # Errors
/// Returns error if the store write fails
pub async fn issue_refresh_token(
    store: &dyn IdentityStore,
    account: &Account,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let token = generate_refresh_token();
    let now = Utc::now();

    store
        .save_refresh_token(&RefreshTokenRecord {
            account_id: account.id,
            token_hash: hash_token(&token),
            security_version: account.security_version,
            expires_at: now + Duration::seconds(config.refresh_token_expiry),
            created_at: now,
        })
        .await?;

    tracing::debug!(account_id = %account.id, "Refresh token issued");
    Ok(token)
}

/// Validate a refresh token presented together with a user name
///
/// Returns `true` only if:
/// 1. The user name resolves to an account
/// 2. A token is stored for that account and its hash matches
/// 3. The account's security version has not changed since issue
/// 4. The token has not expired
///
/// Every failed check yields `false`; callers must not tell them apart.
///
/// # Errors
/// Only store failures are errors
pub async fn validate_refresh_token(
    store: &dyn IdentityStore,
    token: &str,
    identifier: &str,
) -> Result<bool, AppError> {
    if token.is_empty() {
        return Ok(false);
    }

    let account = match store.find_account_by_user_name(&normalize(identifier)).await? {
        Some(account) => account,
        None => {
            tracing::warn!("Refresh attempted for unknown user name");
            return Ok(false);
        }
    };

    let record = match store.find_refresh_token(account.id).await? {
        Some(record) => record,
        None => {
            tracing::warn!(account_id = %account.id, "No refresh token stored for account");
            return Ok(false);
        }
    };

    if !digests_match(&record.token_hash, &hash_token(token)) {
        tracing::warn!(account_id = %account.id, "Refresh token mismatch");
        return Ok(false);
    }

    if record.security_version != account.security_version {
        tracing::info!(account_id = %account.id, "Refresh token predates security version rotation");
        return Ok(false);
    }

    if record.expires_at < Utc::now() {
        tracing::info!(account_id = %account.id, "Refresh token expired");
        return Ok(false);
    }

    Ok(true)
}

/// Invalidate every refresh token of an account
///
/// Drops the stored token and rotates the security version.
///
/// # Errors
/// Returns error if the store write fails or the account is gone
pub async fn invalidate_refresh_tokens(
    store: &dyn IdentityStore,
    account_id: Uuid,
) -> Result<(), AppError> {
    store.remove_refresh_token(account_id).await?;
    let version = store.rotate_security_version(account_id).await?;

    tracing::info!(account_id = %account_id, security_version = version, "Refresh tokens invalidated");
    Ok(())
}

/// Store a new password hash and revoke every refresh token of the account
///
/// The hash and the bumped security version go out in the same
/// concurrency-checked write, so a stored token can never outlive the old
/// password. Dropping the stored digest afterwards is cleanup only.
///
/// # Errors
/// Returns error if the account write fails (stale stamp included)
pub async fn replace_password(
    store: &dyn IdentityStore,
    mut account: Account,
    password_hash: String,
) -> Result<Account, AppError> {
    account.password_hash = password_hash;
    account.security_version += 1;
    let account = store.update_account(&account).await?;

    if let Err(e) = store.remove_refresh_token(account.id).await {
        tracing::warn!(
            account_id = %account.id,
            error = %e,
            "Stale refresh token left behind after password change"
        );
    }

    tracing::info!(
        account_id = %account.id,
        security_version = account.security_version,
        "Password replaced, refresh tokens invalidated"
    );
    Ok(account)
}

/// Credential Validation
///
/// Resolves an account by user name and checks a password against its hash.
/// Unknown user names and wrong passwords end in the same `InvalidCredentials`
/// after the same amount of bcrypt work.

use std::sync::Arc;

use crate::auth::password::{hash_password, verify_password_hash};
use crate::auth::refresh_token::generate_refresh_token;
use crate::configuration::PasswordSettings;
use crate::error::{AppError, AuthError};
use crate::store::{Account, IdentityStore};
use crate::validators::normalize;

pub struct CredentialValidator {
    store: Arc<dyn IdentityStore>,
    /// Hash of a random secret, verified against when the user name is unknown
    dummy_hash: String,
}

impl CredentialValidator {
    /// # Errors
    /// Returns `Internal` if the configured bcrypt cost is invalid
    pub fn new(store: Arc<dyn IdentityStore>, settings: &PasswordSettings) -> Result<Self, AppError> {
        let dummy_hash = hash_password(&generate_refresh_token(), settings)?;
        Ok(Self { store, dummy_hash })
    }

    /// Look up an account by email / user name (case-insensitive)
    pub async fn find_account(&self, identifier: &str) -> Result<Option<Account>, AppError> {
        self.store
            .find_account_by_user_name(&normalize(identifier))
            .await
    }

    /// Check a plaintext password against the account's stored hash
    pub async fn check_password(&self, account: &Account, password: &str) -> Result<bool, AppError> {
        verify_password_hash(password.to_string(), account.password_hash.clone()).await
    }

    /// Resolve and verify in one step
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown user name or a wrong password
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<Account, AppError> {
        let account = self.find_account(identifier).await?;

        let verified = match &account {
            Some(account) => self.check_password(account, password).await?,
            None => {
                verify_password_hash(password.to_string(), self.dummy_hash.clone()).await?;
                false
            }
        };

        match account {
            Some(account) if verified => Ok(account),
            _ => Err(AuthError::InvalidCredentials.into()),
        }
    }
}

/// Identity persistence
///
/// `IdentityStore` is the only way handlers touch accounts, roles, role
/// membership, and stored refresh tokens. `PostgresIdentityStore` is used in
/// production, `MemoryIdentityStore` by tests and local runs.
///
/// Every account write is guarded by the account's `concurrency_stamp`: a
/// write carrying a stamp that no longer matches the stored one fails with
/// `DatabaseError::ConcurrencyConflict` and is not retried.

mod memory;
mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::validators::normalize;

pub use memory::MemoryIdentityStore;
pub use postgres::PostgresIdentityStore;

/// A user account. User name and email are kept identical.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub normalized_email: String,
    pub user_name: String,
    pub normalized_user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    /// Bumped to invalidate every refresh token issued for this account
    pub security_version: i32,
    pub concurrency_stamp: Uuid,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl Account {
    pub fn new(
        email: String,
        first_name: String,
        last_name: String,
        phone_number: Option<String>,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        let mut account = Self {
            id: Uuid::new_v4(),
            email: String::new(),
            normalized_email: String::new(),
            user_name: String::new(),
            normalized_user_name: String::new(),
            first_name,
            last_name,
            phone_number,
            password_hash,
            security_version: 0,
            concurrency_stamp: Uuid::new_v4(),
            date_created: now,
            date_updated: now,
        };
        account.set_email(email);
        account
    }

    /// Sets email and user name together, with their normalized forms
    pub fn set_email(&mut self, email: String) {
        self.normalized_email = normalize(&email);
        self.normalized_user_name = self.normalized_email.clone();
        self.user_name = email.clone();
        self.email = email;
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub concurrency_stamp: Uuid,
}

impl Role {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            normalized_name: normalize(&name),
            name,
            concurrency_stamp: Uuid::new_v4(),
        }
    }

    pub fn rename(&mut self, name: String) {
        self.normalized_name = normalize(&name);
        self.name = name;
    }
}

/// Stored form of a refresh token: only its digest is kept
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub account_id: Uuid,
    pub token_hash: String,
    /// Account security version at the time the token was issued
    pub security_version: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    // accounts
    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError>;
    async fn find_account_by_user_name(
        &self,
        normalized_user_name: &str,
    ) -> Result<Option<Account>, AppError>;
    /// True if another account (other than `except`) already uses the email
    async fn email_in_use(
        &self,
        normalized_email: &str,
        except: Option<Uuid>,
    ) -> Result<bool, AppError>;
    async fn count_accounts(&self) -> Result<i64, AppError>;
    /// Newest first. `limit: None` returns everything after `offset`.
    async fn list_accounts(&self, offset: i64, limit: Option<i64>)
        -> Result<Vec<Account>, AppError>;
    async fn insert_account(&self, account: &Account) -> Result<(), AppError>;
    /// Writes every mutable field if `account.concurrency_stamp` is current;
    /// returns the stored row with its new stamp.
    async fn update_account(&self, account: &Account) -> Result<Account, AppError>;
    async fn delete_account(&self, id: Uuid) -> Result<bool, AppError>;
    /// Atomically increments the security version and returns the new value
    async fn rotate_security_version(&self, id: Uuid) -> Result<i32, AppError>;

    // role membership
    async fn roles_for_account(&self, account_id: Uuid) -> Result<Vec<String>, AppError>;
    async fn roles_for_accounts(
        &self,
        account_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<String>>, AppError>;
    /// Fails with `ValidationError::UnknownRole` if any name does not exist
    async fn add_to_roles(&self, account_id: Uuid, role_names: &[String]) -> Result<(), AppError>;
    async fn remove_from_roles(
        &self,
        account_id: Uuid,
        role_names: &[String],
    ) -> Result<(), AppError>;

    // roles
    async fn count_roles(&self) -> Result<i64, AppError>;
    async fn list_roles(&self, offset: i64, limit: Option<i64>) -> Result<Vec<Role>, AppError>;
    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError>;
    async fn find_role_by_name(&self, normalized_name: &str) -> Result<Option<Role>, AppError>;
    async fn insert_role(&self, role: &Role) -> Result<(), AppError>;
    async fn update_role(&self, role: &Role) -> Result<Role, AppError>;
    async fn delete_role(&self, id: Uuid) -> Result<bool, AppError>;

    // refresh tokens, at most one per account
    async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;
    async fn find_refresh_token(
        &self,
        account_id: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;
    async fn remove_refresh_token(&self, account_id: Uuid) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_email_sets_user_name() {
        let mut account = Account::new(
            "Jane@Example.com".to_string(),
            "Jane".to_string(),
            "Doe".to_string(),
            None,
            "hash".to_string(),
        );

        assert_eq!(account.user_name, "Jane@Example.com");
        assert_eq!(account.normalized_email, "JANE@EXAMPLE.COM");
        assert_eq!(account.normalized_user_name, "JANE@EXAMPLE.COM");
        assert_eq!(account.security_version, 0);

        account.set_email("jane.doe@example.com".to_string());
        assert_eq!(account.user_name, "jane.doe@example.com");
        assert_eq!(account.normalized_user_name, "JANE.DOE@EXAMPLE.COM");
    }

    #[test]
    fn test_role_rename_normalizes() {
        let mut role = Role::new("Editor".to_string());
        assert_eq!(role.normalized_name, "EDITOR");

        role.rename("Chief Editor".to_string());
        assert_eq!(role.name, "Chief Editor");
        assert_eq!(role.normalized_name, "CHIEF EDITOR");
    }
}

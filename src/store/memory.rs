use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Account, IdentityStore, RefreshTokenRecord, Role};
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::validators::normalize;

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    roles: HashMap<Uuid, Role>,
    /// (account id, role id)
    memberships: HashSet<(Uuid, Uuid)>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
}

impl MemoryState {
    fn role_id(&self, name: &str) -> Result<Uuid, AppError> {
        let normalized = normalize(name);
        self.roles
            .values()
            .find(|r| r.normalized_name == normalized)
            .map(|r| r.id)
            .ok_or_else(|| ValidationError::UnknownRole(name.to_string()).into())
    }

    fn role_names(&self, account_id: Uuid) -> Vec<String> {
        let mut names: Vec<String> = self
            .memberships
            .iter()
            .filter(|(a, _)| *a == account_id)
            .filter_map(|(_, r)| self.roles.get(r).map(|role| role.name.clone()))
            .collect();
        names.sort();
        names
    }

    fn email_taken(&self, normalized_email: &str, except: Option<Uuid>) -> bool {
        self.accounts
            .values()
            .any(|a| a.normalized_email == normalized_email && Some(a.id) != except)
    }
}

/// In-process identity store
#[derive(Default)]
pub struct MemoryIdentityStore {
    state: RwLock<MemoryState>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, AppError> {
        self.state
            .read()
            .map_err(|_| AppError::Internal("identity store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, AppError> {
        self.state
            .write()
            .map_err(|_| AppError::Internal("identity store lock poisoned".to_string()))
    }
}

fn duplicate_email() -> AppError {
    AppError::Database(DatabaseError::UniqueConstraintViolation {
        field: "email".to_string(),
        message: "email already exists".to_string(),
    })
}

fn duplicate_role() -> AppError {
    AppError::Database(DatabaseError::UniqueConstraintViolation {
        field: "name".to_string(),
        message: "name already exists".to_string(),
    })
}

fn page<T>(items: Vec<T>, offset: i64, limit: Option<i64>) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit.max(0) as usize).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn find_account_by_user_name(
        &self,
        normalized_user_name: &str,
    ) -> Result<Option<Account>, AppError> {
        Ok(self
            .read()?
            .accounts
            .values()
            .find(|a| a.normalized_user_name == normalized_user_name)
            .cloned())
    }

    async fn email_in_use(
        &self,
        normalized_email: &str,
        except: Option<Uuid>,
    ) -> Result<bool, AppError> {
        Ok(self.read()?.email_taken(normalized_email, except))
    }

    async fn count_accounts(&self) -> Result<i64, AppError> {
        Ok(self.read()?.accounts.len() as i64)
    }

    async fn list_accounts(
        &self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Account>, AppError> {
        let mut accounts: Vec<Account> = self.read()?.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| b.date_created.cmp(&a.date_created).then(a.id.cmp(&b.id)));
        Ok(page(accounts, offset, limit))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        let mut state = self.write()?;
        if state.email_taken(&account.normalized_email, None) {
            return Err(duplicate_email());
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&self, account: &Account) -> Result<Account, AppError> {
        let mut state = self.write()?;
        if state.email_taken(&account.normalized_email, Some(account.id)) {
            return Err(duplicate_email());
        }

        let stored = state.accounts.get_mut(&account.id).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound("account".to_string()))
        })?;

        if stored.concurrency_stamp != account.concurrency_stamp {
            return Err(DatabaseError::ConcurrencyConflict("account".to_string()).into());
        }

        let mut updated = account.clone();
        updated.concurrency_stamp = Uuid::new_v4();
        updated.date_updated = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.write()?;
        let removed = state.accounts.remove(&id).is_some();
        if removed {
            state.memberships.retain(|(a, _)| *a != id);
            state.refresh_tokens.remove(&id);
        }
        Ok(removed)
    }

    async fn rotate_security_version(&self, id: Uuid) -> Result<i32, AppError> {
        let mut state = self.write()?;
        let account = state.accounts.get_mut(&id).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound("account".to_string()))
        })?;
        account.security_version += 1;
        account.concurrency_stamp = Uuid::new_v4();
        Ok(account.security_version)
    }

    async fn roles_for_account(&self, account_id: Uuid) -> Result<Vec<String>, AppError> {
        Ok(self.read()?.role_names(account_id))
    }

    async fn roles_for_accounts(
        &self,
        account_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<String>>, AppError> {
        let state = self.read()?;
        Ok(account_ids
            .iter()
            .map(|id| (*id, state.role_names(*id)))
            .collect())
    }

    async fn add_to_roles(&self, account_id: Uuid, role_names: &[String]) -> Result<(), AppError> {
        let mut state = self.write()?;
        let role_ids = role_names
            .iter()
            .map(|name| state.role_id(name))
            .collect::<Result<Vec<_>, _>>()?;
        for role_id in role_ids {
            state.memberships.insert((account_id, role_id));
        }
        Ok(())
    }

    async fn remove_from_roles(
        &self,
        account_id: Uuid,
        role_names: &[String],
    ) -> Result<(), AppError> {
        let mut state = self.write()?;
        let role_ids = role_names
            .iter()
            .map(|name| state.role_id(name))
            .collect::<Result<Vec<_>, _>>()?;
        for role_id in role_ids {
            state.memberships.remove(&(account_id, role_id));
        }
        Ok(())
    }

    async fn count_roles(&self) -> Result<i64, AppError> {
        Ok(self.read()?.roles.len() as i64)
    }

    async fn list_roles(&self, offset: i64, limit: Option<i64>) -> Result<Vec<Role>, AppError> {
        let mut roles: Vec<Role> = self.read()?.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(roles, offset, limit))
    }

    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, normalized_name: &str) -> Result<Option<Role>, AppError> {
        Ok(self
            .read()?
            .roles
            .values()
            .find(|r| r.normalized_name == normalized_name)
            .cloned())
    }

    async fn insert_role(&self, role: &Role) -> Result<(), AppError> {
        let mut state = self.write()?;
        if state.roles.values().any(|r| r.normalized_name == role.normalized_name) {
            return Err(duplicate_role());
        }
        state.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> Result<Role, AppError> {
        let mut state = self.write()?;
        if state
            .roles
            .values()
            .any(|r| r.normalized_name == role.normalized_name && r.id != role.id)
        {
            return Err(duplicate_role());
        }

        let stored = state.roles.get_mut(&role.id).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound("role".to_string()))
        })?;

        if stored.concurrency_stamp != role.concurrency_stamp {
            return Err(DatabaseError::ConcurrencyConflict("role".to_string()).into());
        }

        let mut updated = role.clone();
        updated.concurrency_stamp = Uuid::new_v4();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.write()?;
        let removed = state.roles.remove(&id).is_some();
        if removed {
            state.memberships.retain(|(_, r)| *r != id);
        }
        Ok(removed)
    }

    async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        let mut state = self.write()?;
        if !state.accounts.contains_key(&record.account_id) {
            return Err(AppError::Database(DatabaseError::NotFound("account".to_string())));
        }
        state.refresh_tokens.insert(record.account_id, record.clone());
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        account_id: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self.read()?.refresh_tokens.get(&account_id).cloned())
    }

    async fn remove_refresh_token(&self, account_id: Uuid) -> Result<(), AppError> {
        self.write()?.refresh_tokens.remove(&account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(email: &str) -> Account {
        Account::new(
            email.to_string(),
            "Test".to_string(),
            "User".to_string(),
            None,
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_case_insensitively() {
        let store = MemoryIdentityStore::new();
        store.insert_account(&account("jane@example.com")).await.unwrap();

        let err = store
            .insert_account(&account("JANE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Database(DatabaseError::UniqueConstraintViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_update_is_a_conflict() {
        let store = MemoryIdentityStore::new();
        let original = account("jane@example.com");
        store.insert_account(&original).await.unwrap();

        let mut first = original.clone();
        first.first_name = "First".to_string();
        let saved = store.update_account(&first).await.unwrap();
        assert_ne!(saved.concurrency_stamp, original.concurrency_stamp);

        let mut second = original.clone();
        second.first_name = "Second".to_string();
        let err = store.update_account(&second).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Database(DatabaseError::ConcurrencyConflict(_))
        ));

        let stored = store.find_account_by_id(original.id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "First");
    }

    #[tokio::test]
    async fn test_rotation_makes_earlier_reads_stale() {
        let store = MemoryIdentityStore::new();
        let original = account("jane@example.com");
        store.insert_account(&original).await.unwrap();

        assert_eq!(store.rotate_security_version(original.id).await.unwrap(), 1);
        assert!(store.update_account(&original).await.is_err());
    }

    #[tokio::test]
    async fn test_role_membership() {
        let store = MemoryIdentityStore::new();
        let jane = account("jane@example.com");
        store.insert_account(&jane).await.unwrap();
        store.insert_role(&Role::new("Administrator".to_string())).await.unwrap();
        store.insert_role(&Role::new("User".to_string())).await.unwrap();

        store
            .add_to_roles(jane.id, &["user".to_string(), "Administrator".to_string()])
            .await
            .unwrap();
        assert_eq!(
            store.roles_for_account(jane.id).await.unwrap(),
            vec!["Administrator".to_string(), "User".to_string()]
        );

        store.remove_from_roles(jane.id, &["User".to_string()]).await.unwrap();
        assert_eq!(
            store.roles_for_account(jane.id).await.unwrap(),
            vec!["Administrator".to_string()]
        );

        let err = store
            .add_to_roles(jane.id, &["Ghost".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::UnknownRole(_))
        ));
    }

    #[tokio::test]
    async fn test_list_accounts_newest_first_with_paging() {
        let store = MemoryIdentityStore::new();
        for i in 0..3 {
            let mut a = account(&format!("user{}@example.com", i));
            a.date_created = a.date_created + chrono::Duration::seconds(i);
            store.insert_account(&a).await.unwrap();
        }

        let all = store.list_accounts(0, None).await.unwrap();
        assert_eq!(all[0].email, "user2@example.com");
        assert_eq!(all[2].email, "user0@example.com");

        let second_page = store.list_accounts(2, Some(2)).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].email, "user0@example.com");
    }

    #[tokio::test]
    async fn test_delete_account_cascades() {
        let store = MemoryIdentityStore::new();
        let jane = account("jane@example.com");
        store.insert_account(&jane).await.unwrap();
        store
            .save_refresh_token(&RefreshTokenRecord {
                account_id: jane.id,
                token_hash: "digest".to_string(),
                security_version: 0,
                expires_at: Utc::now(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.delete_account(jane.id).await.unwrap());
        assert!(!store.delete_account(jane.id).await.unwrap());
        assert!(store.find_refresh_token(jane.id).await.unwrap().is_none());
    }
}

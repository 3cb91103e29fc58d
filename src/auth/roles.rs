/// Role Reconciliation
///
/// Role assignment is an explicit set difference between the roles an
/// account holds and the roles it should hold.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::{AppError, ValidationError};
use crate::store::IdentityStore;
use crate::validators::normalize;

/// Changes needed to move from the current role set to the desired one
#[derive(Debug, Default, PartialEq)]
pub struct RoleDelta {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl RoleDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compare role names case-insensitively; output is sorted and deduplicated
pub fn reconcile_roles(current: &[String], desired: &[String]) -> RoleDelta {
    let current_keys: BTreeSet<String> = current.iter().map(|r| normalize(r)).collect();
    let desired_keys: BTreeSet<String> = desired.iter().map(|r| normalize(r)).collect();

    let mut to_add: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    for role in desired {
        let key = normalize(role);
        if !current_keys.contains(&key) && seen.insert(key) {
            to_add.push(role.trim().to_string());
        }
    }

    let mut to_remove: Vec<String> = current
        .iter()
        .filter(|r| !desired_keys.contains(&normalize(r)))
        .cloned()
        .collect();

    to_add.sort();
    to_remove.sort();
    RoleDelta { to_add, to_remove }
}

/// Fail with `UnknownRole` on the first name that does not resolve to a role
pub async fn ensure_roles_exist(store: &dyn IdentityStore, names: &[String]) -> Result<(), AppError> {
    for name in names {
        if store.find_role_by_name(&normalize(name)).await?.is_none() {
            return Err(ValidationError::UnknownRole(name.trim().to_string()).into());
        }
    }
    Ok(())
}

/// Bring an account's role membership to exactly `desired`
///
/// # Errors
/// `UnknownRole` if a desired role does not exist; membership is untouched
/// in that case because additions are applied before removals and the
/// store validates every name before writing.
pub async fn assign_roles(
    store: &dyn IdentityStore,
    account_id: Uuid,
    desired: &[String],
) -> Result<RoleDelta, AppError> {
    let current = store.roles_for_account(account_id).await?;
    let delta = reconcile_roles(&current, desired);

    if !delta.to_add.is_empty() {
        store.add_to_roles(account_id, &delta.to_add).await?;
    }
    if !delta.to_remove.is_empty() {
        store.remove_from_roles(account_id, &delta.to_remove).await?;
    }

    if !delta.is_empty() {
        tracing::info!(
            account_id = %account_id,
            added = ?delta.to_add,
            removed = ?delta.to_remove,
            "Account roles reconciled"
        );
    }
    Ok(delta)
}

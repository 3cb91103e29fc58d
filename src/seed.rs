/// Startup seeding
///
/// Makes sure the `Administrator` and `User` roles and the configured
/// administrator account exist. The administrator only holds
/// `Administrator`. Running it again changes nothing.

use crate::auth::{assign_roles, compute_password_hash, ADMINISTRATOR_ROLE, USER_ROLE};
use crate::configuration::{PasswordSettings, SeedSettings};
use crate::error::{AppError, ErrorContext};
use crate::store::{Account, IdentityStore, Role};
use crate::validators::{is_valid_email, is_valid_phone, normalize};

pub async fn seed_identity(
    store: &dyn IdentityStore,
    seed: &SeedSettings,
    password: &PasswordSettings,
) -> Result<(), AppError> {
    let context = ErrorContext::new("identity_seed");
    seed_inner(store, seed, password)
        .await
        .map_err(|e| context.log_error(e))
}

async fn seed_inner(
    store: &dyn IdentityStore,
    seed: &SeedSettings,
    password: &PasswordSettings,
) -> Result<(), AppError> {
    for name in [ADMINISTRATOR_ROLE, USER_ROLE] {
        if store.find_role_by_name(&normalize(name)).await?.is_none() {
            store.insert_role(&Role::new(name.to_string())).await?;
            tracing::info!(role = name, "Seeded role");
        }
    }

    let email = is_valid_email(&seed.admin_email)?;
    if store.find_account_by_user_name(&normalize(&email)).await?.is_some() {
        tracing::debug!(email = %email, "Administrator account already present");
        return Ok(());
    }

    let phone_number = is_valid_phone(seed.admin_phone_number.as_deref())?;
    let password_hash = compute_password_hash(seed.admin_password.clone(), password.clone()).await?;
    let admin = Account::new(
        email,
        seed.admin_first_name.clone(),
        seed.admin_last_name.clone(),
        phone_number,
        password_hash,
    );
    store.insert_account(&admin).await?;
    assign_roles(store, admin.id, &[ADMINISTRATOR_ROLE.to_string()]).await?;

    tracing::info!(account_id = %admin.id, email = %admin.email, "Seeded administrator account");
    Ok(())
}

/// User administration routes (Administrator only)

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{assign_roles, ensure_roles_exist};
use crate::error::{AppError, DatabaseError};
use crate::pagination::{PageRequest, PaginatedList, DEFAULT_PAGE_SIZE};
use crate::routes::account::{
    duplicate_email, validate_contact_details, AccountResponse, AccountWithRoles,
};
use crate::store::IdentityStore;
use crate::validators::normalize;

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(rename = "pageNum")]
    pub page_num: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub roles: Vec<String>,
    pub concurrency_stamp: Option<Uuid>,
}

#[derive(Serialize)]
pub struct UserDetailResponse {
    pub user: AccountResponse,
    pub roles: Vec<String>,
}

fn account_not_found() -> AppError {
    DatabaseError::NotFound("account".to_string()).into()
}

/// GET /api/account?pageNum=N
///
/// Newest accounts first, each with its roles. Without `pageNum` the whole
/// list is returned as a plain array.
pub async fn list_users(
    query: web::Query<PageQuery>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let (accounts, page) = match query.page_num {
        Some(page_num) => {
            let request = PageRequest::new(page_num, DEFAULT_PAGE_SIZE);
            let count = store.count_accounts().await?;
            let accounts = store
                .list_accounts(request.offset(), Some(request.page_size))
                .await?;
            (accounts, Some((count, request)))
        }
        None => (store.list_accounts(0, None).await?, None),
    };

    let ids: Vec<Uuid> = accounts.iter().map(|a| a.id).collect();
    let mut roles = store.roles_for_accounts(&ids).await?;
    let users: Vec<AccountWithRoles> = accounts
        .into_iter()
        .map(|account| AccountWithRoles {
            roles: roles.remove(&account.id).unwrap_or_default(),
            account: account.into(),
        })
        .collect();

    Ok(match page {
        Some((count, request)) => {
            HttpResponse::Ok().json(PaginatedList::new(users, count, request))
        }
        None => HttpResponse::Ok().json(users),
    })
}

/// GET /api/account/{id}
pub async fn get_user(
    path: web::Path<Uuid>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let account = store
        .find_account_by_id(id)
        .await?
        .ok_or_else(account_not_found)?;
    let roles = store.roles_for_account(id).await?;

    Ok(HttpResponse::Ok().json(UserDetailResponse {
        user: account.into(),
        roles,
    }))
}

/// PUT /api/account/{id}
///
/// Replace contact details and reconcile the role set.
///
/// # Errors
/// - 400: Field validation errors, unknown role
/// - 404: No such account
/// - 409: Email taken, or the account changed since `concurrencyStamp`
pub async fn update_user(
    path: web::Path<Uuid>,
    body: web::Json<UpdateUserRequest>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let mut account = store
        .find_account_by_id(id)
        .await?
        .ok_or_else(account_not_found)?;

    let mut errors = Vec::new();
    let details = match validate_contact_details(
        &body.email,
        &body.first_name,
        &body.last_name,
        body.phone_number.as_deref(),
        &mut errors,
    ) {
        Some(details) if errors.is_empty() => details,
        _ => return Err(errors.into()),
    };

    if store.email_in_use(&normalize(&details.email), Some(id)).await? {
        return Err(duplicate_email());
    }
    ensure_roles_exist(store.get_ref(), &body.roles).await?;

    account.set_email(details.email);
    account.first_name = details.first_name;
    account.last_name = details.last_name;
    account.phone_number = details.phone_number;
    if let Some(stamp) = body.concurrency_stamp {
        account.concurrency_stamp = stamp;
    }

    store.update_account(&account).await?;
    let delta = assign_roles(store.get_ref(), id, &body.roles).await?;

    tracing::info!(
        account_id = %id,
        roles_added = delta.to_add.len(),
        roles_removed = delta.to_remove.len(),
        "Account updated by administrator"
    );

    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/account/{id}
pub async fn delete_user(
    path: web::Path<Uuid>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !store.delete_account(id).await? {
        return Err(account_not_found());
    }

    tracing::info!(account_id = %id, "Account deleted");
    Ok(HttpResponse::NoContent().finish())
}

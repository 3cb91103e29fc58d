/// Role administration routes (Administrator only)

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, DatabaseError, ValidationError};
use crate::pagination::{PageRequest, PaginatedList, DEFAULT_PAGE_SIZE};
use crate::routes::users::PageQuery;
use crate::store::{IdentityStore, Role};
use crate::validators::is_valid_role_name;

#[derive(Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub id: Uuid,
    pub name: String,
    pub concurrency_stamp: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub concurrency_stamp: Uuid,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            normalized_name: role.normalized_name,
            concurrency_stamp: role.concurrency_stamp,
        }
    }
}

fn role_not_found() -> AppError {
    DatabaseError::NotFound("role".to_string()).into()
}

/// GET /api/roles?pageNum=N
pub async fn list_roles(
    query: web::Query<PageQuery>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    match query.page_num {
        Some(page_num) => {
            let request = PageRequest::new(page_num, DEFAULT_PAGE_SIZE);
            let count = store.count_roles().await?;
            let roles = store
                .list_roles(request.offset(), Some(request.page_size))
                .await?;
            let page = PaginatedList::new(roles, count, request).map(RoleResponse::from);
            Ok(HttpResponse::Ok().json(page))
        }
        None => {
            let roles: Vec<RoleResponse> = store
                .list_roles(0, None)
                .await?
                .into_iter()
                .map(RoleResponse::from)
                .collect();
            Ok(HttpResponse::Ok().json(roles))
        }
    }
}

/// GET /api/roles/{id}
pub async fn get_role(
    path: web::Path<Uuid>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let role = store
        .find_role_by_id(path.into_inner())
        .await?
        .ok_or_else(role_not_found)?;

    Ok(HttpResponse::Ok().json(RoleResponse::from(role)))
}

/// POST /api/roles
///
/// # Errors
/// - 400: Invalid name
/// - 409: A role with the same name (case-insensitive) exists
pub async fn create_role(
    body: web::Json<CreateRoleRequest>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let name = is_valid_role_name(&body.name)?;
    let role = Role::new(name);
    store.insert_role(&role).await?;

    tracing::info!(role_id = %role.id, name = %role.name, "Role created");
    Ok(HttpResponse::Created().json(RoleResponse::from(role)))
}

/// PUT /api/roles/{id}
///
/// # Errors
/// - 400: Body id differs from the path id, or invalid name
/// - 404: No such role
/// - 409: Name taken, or the role changed since `concurrencyStamp`
pub async fn update_role(
    path: web::Path<Uuid>,
    body: web::Json<UpdateRoleRequest>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if body.id != id {
        return Err(ValidationError::Mismatch("id".to_string()).into());
    }

    let mut role = store.find_role_by_id(id).await?.ok_or_else(role_not_found)?;
    role.rename(is_valid_role_name(&body.name)?);
    role.concurrency_stamp = body.concurrency_stamp;
    store.update_role(&role).await?;

    tracing::info!(role_id = %id, name = %role.name, "Role updated");
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/roles/{id}
pub async fn delete_role(
    path: web::Path<Uuid>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !store.delete_role(id).await? {
        return Err(role_not_found());
    }

    tracing::info!(role_id = %id, "Role deleted");
    Ok(HttpResponse::NoContent().finish())
}

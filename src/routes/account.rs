/// Account Routes
///
/// Registration, the cookie-carried session protocol (login, refresh,
/// logout), and the signed-in user's own profile and password.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{
    assign_roles, compute_password_hash, ensure_roles_exist, generate_access_token,
    invalidate_refresh_tokens, issue_refresh_token, replace_password, validate_password_strength,
    validate_refresh_token, Claims, CredentialValidator, ADMINISTRATOR_ROLE,
};
use crate::configuration::{JwtSettings, PasswordSettings};
use crate::error::{
    AppError, AuthError, DatabaseError, ErrorContext, ErrorHandler, ValidationError,
};
use crate::middleware::bearer_claims;
use crate::session::{
    clear_session_cookies, session_cookie, set_session_cookies, SessionCookies, USER_NAME_COOKIE,
};
use crate::store::{Account, IdentityStore};
use crate::validators::{is_valid_email, is_valid_name, is_valid_phone, normalize};

const MAX_LOGIN_PASSWORD_LENGTH: usize = 15;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    /// Stamp of the profile the client edited; omitted means "latest"
    pub concurrency_stamp: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Bearer token plus the roles it carries
#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub roles: Vec<String>,
}

/// Public view of an account. Never includes the password hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub concurrency_stamp: Uuid,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            user_name: account.user_name,
            first_name: account.first_name,
            last_name: account.last_name,
            phone_number: account.phone_number,
            concurrency_stamp: account.concurrency_stamp,
            date_created: account.date_created,
            date_updated: account.date_updated,
        }
    }
}

#[derive(Serialize)]
pub struct AccountWithRoles {
    #[serde(flatten)]
    pub account: AccountResponse,
    pub roles: Vec<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

/// Keep the value if valid, otherwise record the error
pub(crate) fn check<T>(
    result: Result<T, ValidationError>,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    result.map_err(|e| errors.push(e)).ok()
}

/// Validated contact fields shared by registration and profile/user updates
pub(crate) struct ContactDetails {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

pub(crate) fn validate_contact_details(
    email: &str,
    first_name: &str,
    last_name: &str,
    phone_number: Option<&str>,
    errors: &mut Vec<ValidationError>,
) -> Option<ContactDetails> {
    let email = check(is_valid_email(email), errors);
    let first_name = check(is_valid_name(first_name, "firstName"), errors);
    let last_name = check(is_valid_name(last_name, "lastName"), errors);
    let phone_number = check(is_valid_phone(phone_number), errors);

    Some(ContactDetails {
        email: email?,
        first_name: first_name?,
        last_name: last_name?,
        phone_number: phone_number?,
    })
}

pub(crate) fn duplicate_email() -> AppError {
    DatabaseError::UniqueConstraintViolation {
        field: "email".to_string(),
        message: "Email already exists".to_string(),
    }
    .into()
}

/// POST /api/account/register
///
/// Create an account. Asking for roles requires an Administrator bearer token.
///
/// # Errors
/// - 400: Field validation errors, unknown role
/// - 403: Roles requested without Administrator rights
/// - 409: Email already registered
pub async fn register(
    req: HttpRequest,
    body: web::Json<RegisterRequest>,
    store: web::Data<dyn IdentityStore>,
    jwt_config: web::Data<JwtSettings>,
    password_settings: web::Data<PasswordSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request("account_registration", &req);
    let form = body.into_inner();

    if !form.roles.is_empty() {
        let is_admin = bearer_claims(req.headers(), &jwt_config)?
            .map_or(false, |claims| claims.has_role(ADMINISTRATOR_ROLE));
        if !is_admin {
            return Err(AuthError::Forbidden.into());
        }
    }

    let mut errors = Vec::new();
    let details = validate_contact_details(
        &form.email,
        &form.first_name,
        &form.last_name,
        form.phone_number.as_deref(),
        &mut errors,
    );
    check(validate_password_strength(&form.password), &mut errors);

    let details = match details {
        Some(details) if errors.is_empty() => details,
        _ => return Err(errors.into()),
    };

    if store.email_in_use(&normalize(&details.email), None).await? {
        return Err(duplicate_email());
    }
    ensure_roles_exist(store.get_ref(), &form.roles).await?;

    let password_hash =
        compute_password_hash(form.password, password_settings.get_ref().clone()).await?;
    let account = Account::new(
        details.email,
        details.first_name,
        details.last_name,
        details.phone_number,
        password_hash,
    );
    store.insert_account(&account).await?;
    assign_roles(store.get_ref(), account.id, &form.roles).await?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = %account.id,
        roles = ?form.roles,
        "Account registered"
    );

    Ok(HttpResponse::Accepted().finish())
}

/// POST /api/account/login
///
/// Validate credentials, mint a bearer token and start a cookie session.
///
/// # Errors
/// - 400: Empty email or password
/// - 401: Unknown email or wrong password; any session cookies are cleared
pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    validator: web::Data<CredentialValidator>,
    store: web::Data<dyn IdentityStore>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request("account_login", &req);

    let mut errors = Vec::new();
    if body.email.trim().is_empty() {
        errors.push(ValidationError::EmptyField("email".to_string()));
    }
    if body.password.is_empty() {
        errors.push(ValidationError::EmptyField("password".to_string()));
    } else if body.password.chars().count() > MAX_LOGIN_PASSWORD_LENGTH {
        errors.push(ValidationError::TooLong(
            "password".to_string(),
            MAX_LOGIN_PASSWORD_LENGTH,
        ));
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let account = match validator.authenticate(&body.email, &body.password).await {
        Ok(account) => account,
        Err(AppError::Auth(AuthError::InvalidCredentials)) => {
            let error = AppError::Auth(AuthError::InvalidCredentials);
            error.log_error(&context.request_id);
            let (status, payload) = ErrorHandler::error_response(&error, &context.request_id);

            let mut builder = HttpResponse::build(status);
            clear_session_cookies(&req, &mut builder);
            return Ok(builder.json(payload));
        }
        Err(e) => return Err(e),
    };

    let roles = store.roles_for_account(account.id).await?;
    let refresh_token = issue_refresh_token(store.get_ref(), &account, &jwt_config).await?;
    let token = generate_access_token(&account.id, &account.user_name, &roles, &jwt_config)?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = %account.id,
        "Login succeeded"
    );

    let mut builder = HttpResponse::Accepted();
    set_session_cookies(
        &mut builder,
        &account.email,
        refresh_token,
        jwt_config.refresh_token_expiry,
    );
    Ok(builder.json(SessionResponse { token, roles }))
}

/// GET /api/account/refresh
///
/// Mint a new bearer token from the `userName` / `refreshToken` cookies.
/// The cookies themselves are left unchanged.
///
/// # Errors
/// - 400: Missing cookie, or a session that does not validate
pub async fn refresh(
    req: HttpRequest,
    store: web::Data<dyn IdentityStore>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request("session_refresh", &req);
    let cookies = SessionCookies::from_request(&req)?;

    if !validate_refresh_token(store.get_ref(), &cookies.refresh_token, &cookies.user_name).await? {
        return Err(AuthError::InvalidSession.into());
    }

    let account = store
        .find_account_by_user_name(&normalize(&cookies.user_name))
        .await?
        .ok_or(AuthError::InvalidSession)?;
    let roles = store.roles_for_account(account.id).await?;
    let token = generate_access_token(&account.id, &account.user_name, &roles, &jwt_config)?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = %account.id,
        "Bearer token refreshed"
    );

    Ok(HttpResponse::Accepted().json(SessionResponse { token, roles }))
}

/// GET /api/account/logout
///
/// Always 200. A refresh token that still validates is revoked and the
/// account's security version rotated; whichever session cookies the request
/// carried are cleared.
pub async fn logout(
    req: HttpRequest,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request("session_logout", &req);

    if let Ok(cookies) = SessionCookies::from_request(&req) {
        let valid =
            validate_refresh_token(store.get_ref(), &cookies.refresh_token, &cookies.user_name)
                .await?;
        if valid {
            if let Some(account) = store
                .find_account_by_user_name(&normalize(&cookies.user_name))
                .await?
            {
                invalidate_refresh_tokens(store.get_ref(), account.id).await?;
                tracing::info!(
                    request_id = %context.request_id,
                    account_id = %account.id,
                    "Session ended"
                );
            }
        }
    }

    let mut builder = HttpResponse::Ok();
    clear_session_cookies(&req, &mut builder);
    Ok(builder.finish())
}

async fn current_account(claims: &Claims, store: &dyn IdentityStore) -> Result<Account, AppError> {
    store
        .find_account_by_id(claims.account_id()?)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("account".to_string()).into())
}

/// GET /api/account/profile
///
/// The signed-in account and its roles.
pub async fn get_profile(
    claims: web::ReqData<Claims>,
    store: web::Data<dyn IdentityStore>,
) -> Result<HttpResponse, AppError> {
    let account = current_account(&claims, store.get_ref()).await?;
    let roles = store.roles_for_account(account.id).await?;

    Ok(HttpResponse::Ok().json(AccountWithRoles {
        account: account.into(),
        roles,
    }))
}

/// PUT /api/account/profile/update
///
/// Update email, names and phone number of the signed-in account. Changing
/// the email re-issues the `userName` cookie so the session keeps working.
///
/// # Errors
/// - 400: Field validation errors
/// - 409: Email taken by another account, or the profile changed meanwhile
pub async fn update_profile(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    body: web::Json<UpdateProfileRequest>,
    store: web::Data<dyn IdentityStore>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context =
        ErrorContext::for_request("profile_update", &req).with_user_id(claims.sub.clone());
    let mut account = current_account(&claims, store.get_ref()).await?;

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

    if store
        .email_in_use(&normalize(&details.email), Some(account.id))
        .await?
    {
        return Err(duplicate_email());
    }

    let email_changed = normalize(&details.email) != account.normalized_email;
    account.set_email(details.email);
    account.first_name = details.first_name;
    account.last_name = details.last_name;
    account.phone_number = details.phone_number;
    if let Some(stamp) = body.concurrency_stamp {
        account.concurrency_stamp = stamp;
    }

    let account = store.update_account(&account).await?;
    let roles = store.roles_for_account(account.id).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = ?context.user_id,
        email_changed,
        "Profile updated"
    );

    let mut builder = HttpResponse::Ok();
    if email_changed {
        builder.cookie(session_cookie(
            USER_NAME_COOKIE,
            account.email.clone(),
            jwt_config.refresh_token_expiry,
        ));
    }
    Ok(builder.json(AccountWithRoles {
        account: account.into(),
        roles,
    }))
}

/// PUT /api/account/profile/changepassword
///
/// Replace the password after checking the current one. Every outstanding
/// refresh token of the account stops validating.
///
/// # Errors
/// - 400: Wrong current password, or new password fails the policy
pub async fn change_password(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    body: web::Json<ChangePasswordRequest>,
    validator: web::Data<CredentialValidator>,
    store: web::Data<dyn IdentityStore>,
    password_settings: web::Data<PasswordSettings>,
) -> Result<HttpResponse, AppError> {
    let context =
        ErrorContext::for_request("password_change", &req).with_user_id(claims.sub.clone());
    let account = current_account(&claims, store.get_ref()).await?;

    if !validator
        .check_password(&account, &body.current_password)
        .await?
    {
        return Err(ValidationError::PasswordMismatch.into());
    }
    validate_password_strength(&body.new_password)?;

    let password_hash = compute_password_hash(
        body.new_password.clone(),
        password_settings.get_ref().clone(),
    )
    .await?;
    replace_password(store.get_ref(), account, password_hash).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = ?context.user_id,
        "Password changed"
    );

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Password changed successfully.",
    }))
}

/// Session Cookie Layer
///
/// Two cookies carry a session between client and server:
/// - `userName`: the account email, in plaintext
/// - `refreshToken`: the opaque refresh token
///
/// Both are `HttpOnly`, `Secure`, path `/`, and live as long as the refresh
/// token itself.

use actix_web::cookie::time::{Duration, OffsetDateTime};
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponseBuilder};

use crate::error::{AppError, ValidationError};

pub const USER_NAME_COOKIE: &str = "userName";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// The two session cookies as presented by a client
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCookies {
    pub user_name: String,
    pub refresh_token: String,
}

impl SessionCookies {
    /// Read both cookies, failing before any lookup if either is absent or empty
    ///
    /// # Errors
    /// `MissingCookie` (400 Bad Request), never an authentication error
    pub fn from_request(req: &HttpRequest) -> Result<Self, AppError> {
        let user_name = non_empty_cookie(req, USER_NAME_COOKIE)?;
        let refresh_token = non_empty_cookie(req, REFRESH_TOKEN_COOKIE)?;
        Ok(Self {
            user_name,
            refresh_token,
        })
    }
}

fn non_empty_cookie(req: &HttpRequest, name: &str) -> Result<String, AppError> {
    req.cookie(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::MissingCookie(name.to_string()).into())
}

/// Build one session cookie valid for `lifetime_seconds`
pub fn session_cookie(name: &str, value: String, lifetime_seconds: i64) -> Cookie<'static> {
    let lifetime = Duration::seconds(lifetime_seconds);
    Cookie::build(name.to_string(), value)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(lifetime)
        .expires(OffsetDateTime::now_utc() + lifetime)
        .finish()
}

/// Attach both session cookies to a response
pub fn set_session_cookies(
    builder: &mut HttpResponseBuilder,
    user_name: &str,
    refresh_token: String,
    lifetime_seconds: i64,
) {
    builder.cookie(session_cookie(
        USER_NAME_COOKIE,
        user_name.to_string(),
        lifetime_seconds,
    ));
    builder.cookie(session_cookie(
        REFRESH_TOKEN_COOKIE,
        refresh_token,
        lifetime_seconds,
    ));
}

/// Expire whichever session cookies the request carried
pub fn clear_session_cookies(req: &HttpRequest, builder: &mut HttpResponseBuilder) {
    for name in [USER_NAME_COOKIE, REFRESH_TOKEN_COOKIE] {
        if req.cookie(name).is_some() {
            let mut removal = Cookie::build(name, "")
                .path("/")
                .http_only(true)
                .secure(true)
                .finish();
            removal.make_removal();
            builder.cookie(removal);
        }
    }
}

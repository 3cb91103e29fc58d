/// JWT Authentication Middleware
///
/// Validates bearer tokens from the Authorization header and injects
/// claims into request extensions for use by route handlers. Optionally
/// requires a role claim on top of a valid token.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{validate_access_token, Claims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Read and validate an optional bearer token
///
/// `Ok(None)` when no `Authorization: Bearer` header is present; an error
/// when one is present but does not validate.
pub fn bearer_claims(headers: &HeaderMap, jwt_config: &JwtSettings) -> Result<Option<Claims>, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match token {
        None => Ok(None),
        Some(token) => validate_access_token(token, jwt_config).map(Some),
    }
}

/// JWT middleware for protecting routes
///
/// Missing or invalid tokens are rejected with 401, a valid token without the
/// required role with 403.
pub struct JwtMiddleware {
    jwt_config: JwtSettings,
    required_role: Option<&'static str>,
}

impl JwtMiddleware {
    pub fn new(jwt_config: JwtSettings) -> Self {
        Self {
            jwt_config,
            required_role: None,
        }
    }

    /// Only let through tokens carrying `role`
    pub fn require_role(mut self, role: &'static str) -> Self {
        self.required_role = Some(role);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            jwt_config: self.jwt_config.clone(),
            required_role: self.required_role,
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    jwt_config: JwtSettings,
    required_role: Option<&'static str>,
}

impl<S> JwtMiddlewareService<S> {
    fn authorize(&self, req: &ServiceRequest) -> Result<Claims, AppError> {
        let claims = bearer_claims(req.headers(), &self.jwt_config)?.ok_or_else(|| {
            tracing::warn!(path = %req.path(), "Missing or invalid Authorization header");
            AppError::Auth(AuthError::MissingToken)
        })?;

        if let Some(role) = self.required_role {
            if !claims.has_role(role) {
                tracing::warn!(
                    user_id = %claims.sub,
                    required_role = role,
                    path = %req.path(),
                    "Role check failed"
                );
                return Err(AuthError::Forbidden.into());
            }
        }

        Ok(claims)
    }
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match self.authorize(&req) {
            Ok(claims) => {
                tracing::debug!(
                    user_id = %claims.sub,
                    name = %claims.name,
                    "JWT validated successfully"
                );
                req.extensions_mut().insert(claims);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => Box::pin(async move { Err(e.into()) }),
        }
    }
}

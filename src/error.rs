/// Error Handling Module
///
/// One error type for the whole service, built from small domain enums:
/// 1. Domain-Specific Error Types (validation, database, auth, config)
/// 2. Unified AppError used for control flow (`?` everywhere)
/// 3. HTTP Response Mapping with structured, field-level payloads
/// 4. Structured Error Logging with Context

use actix_web::{error::ResponseError, http::StatusCode, HttpMessage, HttpRequest, HttpResponse};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use crate::logger::{current_request_id, RequestId};

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
    /// Password rules that were not satisfied
    PasswordPolicy(Vec<&'static str>),
    /// Current password supplied to a password change was wrong
    PasswordMismatch,
    /// Path id and body id disagree
    Mismatch(String),
    UnknownRole(String),
    /// A cookie required by the session protocol is absent or empty
    MissingCookie(String),
}

impl ValidationError {
    /// Key used in the `errors` map of the HTTP response
    pub fn field(&self) -> &str {
        match self {
            ValidationError::EmptyField(field)
            | ValidationError::TooShort(field, _)
            | ValidationError::TooLong(field, _)
            | ValidationError::InvalidFormat(field)
            | ValidationError::SuspiciousContent(field)
            | ValidationError::Mismatch(field)
            | ValidationError::MissingCookie(field) => field,
            ValidationError::PasswordPolicy(_) => "password",
            ValidationError::PasswordMismatch => "currentPassword",
            ValidationError::UnknownRole(_) => "roles",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::PasswordPolicy(rules) => {
                write!(f, "password must contain {}", rules.join(", "))
            }
            ValidationError::PasswordMismatch => write!(f, "Incorrect password"),
            ValidationError::Mismatch(field) => write!(f, "{} does not match the request path", field),
            ValidationError::UnknownRole(role) => write!(f, "role '{}' does not exist", role),
            ValidationError::MissingCookie(name) => write!(f, "missing cookie '{}'", name),
        }
    }
}

impl StdError for ValidationError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation { field: String, message: String },
    /// Optimistic concurrency check failed: the record changed since it was read
    ConcurrencyConflict(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation { message, .. } => {
                write!(f, "Duplicate entry: {}", message)
            }
            DatabaseError::ConcurrencyConflict(what) => {
                write!(f, "{} was modified by another request", what)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication and authorization errors
#[derive(Debug, PartialEq)]
pub enum AuthError {
    /// Unknown account or wrong password. Never says which.
    InvalidCredentials,
    /// Refresh cookies did not validate (unknown user, wrong token, rotated stamp, expired)
    InvalidSession,
    TokenExpired,
    TokenInvalid,
    MissingToken,
    Forbidden,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::InvalidSession => write!(f, "Invalid session"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::Forbidden => write!(f, "Insufficient permissions"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    /// Several field errors reported together (e.g. registration forms)
    InvalidFields(Vec<ValidationError>),
    Database(DatabaseError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::InvalidFields(errors) => {
                let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", messages.join("; "))
            }
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS (Control Flow Error Conversion)
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<Vec<ValidationError>> for AppError {
    fn from(mut errors: Vec<ValidationError>) -> Self {
        if errors.len() == 1 {
            AppError::Validation(errors.remove(0))
        } else {
            AppError::InvalidFields(errors)
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                let field = match db_err.constraint() {
                    Some(c) if c.contains("email") || c.contains("user_name") => "email",
                    _ => "name",
                };
                return AppError::Database(DatabaseError::UniqueConstraintViolation {
                    field: field.to_string(),
                    message: format!("{} already exists", field),
                });
            }
            return AppError::Database(DatabaseError::QueryExecution(db_err.to_string()));
        }

        match err {
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            other => AppError::Database(DatabaseError::UnexpectedError(other.to_string())),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(DatabaseError::UnexpectedError(err.to_string()))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
    /// Field name -> messages, for validation and conflict errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            errors: None,
        }
    }

    pub fn with_field_errors<'a, I>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (field, message) in errors {
            map.entry(field.to_string()).or_default().push(message);
        }
        self.errors = Some(map);
        self
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(ValidationError::MissingCookie(_)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_REQUEST")
            }
            AppError::Validation(_) | AppError::InvalidFields(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation { .. } => {
                    (StatusCode::CONFLICT, "DUPLICATE_ENTRY")
                }
                DatabaseError::ConcurrencyConflict(_) => {
                    (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT")
                }
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                DatabaseError::ConnectionPool(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            },
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
                // The refresh endpoint answers 400 for any session it cannot honour
                AuthError::InvalidSession => (StatusCode::BAD_REQUEST, "INVALID_SESSION"),
                AuthError::TokenExpired | AuthError::TokenInvalid => {
                    (StatusCode::UNAUTHORIZED, "TOKEN_INVALID")
                }
                AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN"),
                AuthError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code) = self.status_and_code();

        let message = match self {
            AppError::Validation(e) => e.to_string(),
            AppError::InvalidFields(_) => "One or more validation errors occurred".to_string(),
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation { .. }
                | DatabaseError::ConcurrencyConflict(_)
                | DatabaseError::NotFound(_) => e.to_string(),
                DatabaseError::ConnectionPool(_) => {
                    "Database service temporarily unavailable".to_string()
                }
                _ => "Database error occurred".to_string(),
            },
            AppError::Auth(e) => match e {
                AuthError::TokenExpired | AuthError::TokenInvalid => {
                    "Invalid or expired token".to_string()
                }
                _ => e.to_string(),
            },
            AppError::Config(_) => "Server configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        };

        let response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        let response = match self {
            AppError::Validation(e) => response.with_field_errors([(e.field(), e.to_string())]),
            AppError::InvalidFields(errors) => {
                response.with_field_errors(errors.iter().map(|e| (e.field(), e.to_string())))
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation { field, message }) => {
                response.with_field_errors([(field.as_str(), message.clone())])
            }
            _ => response,
        };

        (status, response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Validation error"
                );
            }
            AppError::Database(
                DatabaseError::UniqueConstraintViolation { .. }
                | DatabaseError::ConcurrencyConflict(_)
                | DatabaseError::NotFound(_),
            ) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Rejected database write"
                );
            }
            AppError::Database(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Database error"
                );
            }
            AppError::Auth(e) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %e,
                    "Authentication error"
                );
            }
            AppError::Config(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Configuration error"
                );
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    request_id = request_id,
                    error = %msg,
                    "Internal error"
                );
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = current_request_id()
            .unwrap_or_else(uuid::Uuid::new_v4)
            .to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Reuse the id `LoggerMiddleware` assigned, so handler logs line up
    /// with the `x-request-id` response header
    pub fn for_request(operation: impl Into<String>, req: &HttpRequest) -> Self {
        let mut context = Self::new(operation);
        if let Some(RequestId(id)) = req.extensions().get::<RequestId>() {
            context.request_id = id.to_string();
        }
        context
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Log an error with the operation context, then hand it back for `?`
    pub fn log_error(&self, error: AppError) -> AppError {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match &error {
            AppError::Validation(_) | AppError::InvalidFields(_) | AppError::Auth(_) => {
                tracing::warn!(
                    error = %error,
                    context = ?context,
                    "Request rejected"
                );
            }
            _ => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Request failed"
                );
            }
        }

        error
    }
}

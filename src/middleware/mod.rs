/// Middleware module
///
/// Bearer token authentication and role checks.

mod jwt_middleware;

pub use jwt_middleware::{bearer_claims, JwtMiddleware};

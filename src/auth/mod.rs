/// Authentication module
///
/// Credential validation, bearer token issuing/validation, password hashing,
/// refresh token management, and role reconciliation.

mod claims;
mod credentials;
mod jwt;
mod password;
mod refresh_token;
mod roles;

pub use claims::Claims;
pub use credentials::CredentialValidator;
pub use jwt::generate_access_token;
pub use jwt::validate_access_token;
pub use password::compute_password_hash;
pub use password::hash_password;
pub use password::validate_password_strength;
pub use password::verify_password;
pub use password::verify_password_hash;
pub use refresh_token::invalidate_refresh_tokens;
pub use refresh_token::issue_refresh_token;
pub use refresh_token::replace_password;
pub use refresh_token::validate_refresh_token;
pub use roles::{assign_roles, ensure_roles_exist, reconcile_roles, RoleDelta};

/// Role allowed to administer accounts and roles
pub const ADMINISTRATOR_ROLE: &str = "Administrator";
/// Role given to the seeded baseline
pub const USER_ROLE: &str = "User";

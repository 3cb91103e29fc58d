mod account;
mod health_check;
mod roles;
mod users;

pub use account::{
    change_password, get_profile, login, logout, refresh, register, update_profile,
    AccountResponse, AccountWithRoles, SessionResponse,
};
pub use health_check::health_check;
pub use roles::{create_role, delete_role, get_role, list_roles, update_role, RoleResponse};
pub use users::{delete_user, get_user, list_users, update_user, UserDetailResponse};

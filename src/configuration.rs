use config::ConfigError;

use crate::error::{AppError, ConfigError as SettingsError};

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
    #[serde(default)]
    pub seed: SeedSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds, also the session cookie lifetime (86400 = 1 day)
    pub issuer: String,
}

/// Password hashing settings
#[derive(serde::Deserialize, Clone)]
pub struct PasswordSettings {
    /// bcrypt work factor (4..=31)
    pub hash_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Administrator account created on first start
#[derive(serde::Deserialize, Clone)]
pub struct SeedSettings {
    pub admin_email: String,
    pub admin_password: String,
    pub admin_first_name: String,
    pub admin_last_name: String,
    #[serde(default = "default_admin_phone_number")]
    pub admin_phone_number: Option<String>,
}

fn default_admin_phone_number() -> Option<String> {
    Some("0413662048".to_string())
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            admin_email: "admin@example.com".to_string(),
            admin_password: "P@ssw0rd1".to_string(),
            admin_first_name: "admin".to_string(),
            admin_last_name: "example".to_string(),
            admin_phone_number: default_admin_phone_number(),
        }
    }
}

const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

impl Settings {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(SettingsError::MissingRequired("jwt.secret".to_string()).into());
        }
        if self.jwt.access_token_expiry <= 0 || self.jwt.refresh_token_expiry <= 0 {
            return Err(SettingsError::InvalidValue(
                "jwt token expiries must be positive".to_string(),
            )
            .into());
        }
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.password.hash_cost) {
            return Err(SettingsError::InvalidValue(format!(
                "password.hash_cost must be between {} and {}",
                MIN_HASH_COST, MAX_HASH_COST
            ))
            .into());
        }
        Ok(())
    }
}

/// Loads `configuration.yaml` (if present), then applies `APP_` environment
/// overrides, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}

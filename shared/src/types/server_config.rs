use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::claims::Role;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Deployment environment
// ---------------------------------------------------------------------------

/// Value of `APP_ENV`. Anything unrecognised is treated as production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Production,
    Development,
    Test,
}

impl AppEnv {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development") | Some("dev") => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("APP_ENV").ok().as_deref())
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Peers allowed to report the client address through `X-Forwarded-For`
    /// or `X-Real-IP`. Those headers are ignored from anyone else.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

/// Account inserted into the user database at startup if its id is free.
#[derive(Debug, Deserialize, Clone)]
pub struct SeedUser {
    pub id: i64,
    pub email: String,
    /// Argon2 PHC string, never a plaintext password.
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_expiry")]
    pub token_expiry_minutes: u64,
    /// HMAC key used to sign and verify tokens.
    ///
    /// Prefer loading this via the `JWT_SECRET` environment variable. There
    /// is no built-in fallback: startup fails if neither source is set.
    ///
    /// **Minimum length:** 32 characters.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Older cookie name still accepted on input and cleared on logout.
    #[serde(default = "default_legacy_cookie_name")]
    pub legacy_cookie_name: String,
    #[serde(default)]
    pub seed_users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite file holding user accounts. Created on first start.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:8080"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AuthConfig {
    /// Token lifetime in seconds. The loader caps `token_expiry_minutes` at
    /// [`MAX_TOKEN_EXPIRY_MINUTES`]; the multiplication saturates regardless.
    pub fn token_expiry_secs(&self) -> u64 {
        self.token_expiry_minutes.saturating_mul(60)
    }

    /// Resolve the signing secret, with the `JWT_SECRET` value (passed in by
    /// the loader) taking priority over the config file field.
    pub fn resolve_jwt_secret_with(&self, env_value: Option<String>) -> Option<String> {
        env_value
            .filter(|s| !s.is_empty())
            .or_else(|| self.jwt_secret.clone())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Upper bound for `auth.token_expiry_minutes` (one year).
pub const MAX_TOKEN_EXPIRY_MINUTES: u64 = 60 * 24 * 365;

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    8080
}

pub fn default_max_body_bytes() -> usize {
    64 * 1024
}

pub fn default_token_expiry() -> u64 {
    60
}

pub fn default_cookie_name() -> String {
    "auth_token".to_string()
}

pub fn default_legacy_cookie_name() -> String {
    "jwt".to_string()
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("data/users.db")
}

pub fn default_max_attempts() -> usize {
    5
}

pub fn default_window_secs() -> u64 {
    600
}

pub fn default_store_path() -> PathBuf {
    PathBuf::from("data/rate_limits.json")
}

pub fn default_lock_timeout_ms() -> u64 {
    2000
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_file() -> PathBuf {
    PathBuf::from("logs/app.log")
}

pub fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expiry_minutes: default_token_expiry(),
            jwt_secret: None,
            cookie_name: default_cookie_name(),
            legacy_cookie_name: default_legacy_cookie_name(),
            seed_users: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
            store_path: default_store_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_secret_wins_over_config_field() {
        let auth = AuthConfig {
            jwt_secret: Some("from-config".into()),
            ..AuthConfig::default()
        };
        assert_eq!(
            auth.resolve_jwt_secret_with(Some("from-env".into())).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            auth.resolve_jwt_secret_with(Some(String::new())).as_deref(),
            Some("from-config")
        );
    }

    #[test]
    fn missing_secret_resolves_to_none() {
        let auth = AuthConfig::default();
        assert!(auth.resolve_jwt_secret_with(None).is_none());
    }

    #[test]
    fn expiry_seconds_saturate_instead_of_overflowing() {
        let auth = AuthConfig {
            token_expiry_minutes: u64::MAX,
            ..AuthConfig::default()
        };
        assert_eq!(auth.token_expiry_secs(), u64::MAX);
        assert_eq!(AuthConfig::default().token_expiry_secs(), 3600);
    }

    #[test]
    fn app_env_only_matches_literal_test() {
        assert!(AppEnv::parse(Some("test")).is_test());
        assert!(!AppEnv::parse(Some("TEST")).is_test());
        assert!(!AppEnv::parse(Some("testing")).is_test());
        assert_eq!(AppEnv::parse(None), AppEnv::Production);
    }
}

use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError, MAX_TOKEN_EXPIRY_MINUTES};

/// Minimum accepted length of the token signing secret.
pub const MIN_SECRET_LEN: usize = 32;

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path.display());

    parse_config(&contents, std::env::var("JWT_SECRET").ok())
}

/// Parse and validate a TOML config. `env_secret` is the value of
/// `JWT_SECRET`, which overrides `auth.jwt_secret` when non-empty.
pub fn parse_config(contents: &str, env_secret: Option<String>) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let mut config: AppConfig = toml::from_str(contents)?;
    config.auth.jwt_secret = config.auth.resolve_jwt_secret_with(env_secret);

    info!("Configuration loaded successfully");

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.auth.token_expiry_minutes == 0 {
        return Err(ConfigError::InvalidConfig(
            "token_expiry_minutes must be greater than 0".into(),
        ));
    }

    if config.auth.token_expiry_minutes > MAX_TOKEN_EXPIRY_MINUTES {
        return Err(ConfigError::InvalidConfig(format!(
            "token_expiry_minutes must not exceed {}",
            MAX_TOKEN_EXPIRY_MINUTES
        )));
    }

    if config.auth.cookie_name.is_empty() || config.auth.legacy_cookie_name.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "cookie_name and legacy_cookie_name cannot be empty".into(),
        ));
    }

    if config.auth.cookie_name == config.auth.legacy_cookie_name {
        return Err(ConfigError::InvalidConfig(
            "cookie_name and legacy_cookie_name must differ".into(),
        ));
    }

    if config.rate_limit.max_attempts == 0 || config.rate_limit.window_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "rate_limit.max_attempts and rate_limit.window_secs must be greater than 0".into(),
        ));
    }

    if config.database.path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidConfig("database.path cannot be empty".into()));
    }

    if config.logging.max_file_bytes == 0 {
        return Err(ConfigError::InvalidConfig(
            "logging.max_file_bytes must be greater than 0".into(),
        ));
    }

    // Rejected here so a missing secret stops startup instead of surfacing
    // at the first login.
    match config.auth.jwt_secret.as_deref() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "jwt_secret must be set via the JWT_SECRET env var or auth.jwt_secret config field"
                    .into(),
            ));
        }
        Some(secret) if secret.len() < MIN_SECRET_LEN => {
            return Err(ConfigError::InvalidConfig(format!(
                "jwt_secret must be at least {} characters long",
                MIN_SECRET_LEN
            )));
        }
        _ => {}
    }

    Ok(())
}

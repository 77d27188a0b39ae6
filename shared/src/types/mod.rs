pub mod claims;
pub mod json_error;
pub mod login;
pub mod register;
pub mod server_config;

pub use self::claims::{Claims, Role, RoleParseError};
pub use self::json_error::ErrorResponse;
pub use self::login::{AuthSuccess, LoginData, LoginError, PasswordResetData, UserSummary};
pub use self::register::{RegistrationData, RegistrationError};
pub use self::server_config::{
    AppConfig, AppEnv, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig,
    MAX_TOKEN_EXPIRY_MINUTES, RateLimitConfig, SeedUser, ServerConfig,
};

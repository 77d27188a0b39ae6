use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::types::claims::Role;
use crate::types::json_error::ErrorResponse;

// ---------------------------------------------------------------------------
// Login wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginData {
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Public view of an account, safe to put in a response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: Option<String>,
    pub role: Role,
}

/// Body returned by login and registration once a token has been issued.
#[derive(Debug, Serialize)]
pub struct AuthSuccess {
    pub success: bool,
    pub message: String,
    /// Signed token string. Also set as the primary auth cookie.
    pub token: String,
    pub expires_in: u64,
    pub user: UserSummary,
}

impl AuthSuccess {
    pub fn new(message: &str, token: String, expires_in: u64, user: UserSummary) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            token,
            expires_in,
            user,
        }
    }
}

// ---------------------------------------------------------------------------
// Login errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum LoginError {
    InvalidCredentials,
    MissingField(String),
    TooManyAttempts,
    InternalError,
}

impl LoginError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::MissingField(field) => format!("Missing required field: {}", field),
            Self::TooManyAttempts => "Too many attempts, please try again later".to_string(),
            Self::InternalError => "An internal error occurred".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::MissingField(_) => StatusCode::BAD_REQUEST,
            Self::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(&self.to_message())
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_code())
    }
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PasswordResetData {
    pub email: String,
}

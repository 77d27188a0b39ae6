use std::fmt;

use http::StatusCode;
use serde::Deserialize;

use crate::types::json_error::ErrorResponse;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationData {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

/// Error codes for registration
#[derive(Debug)]
pub enum RegistrationError {
    EmailTaken,
    InvalidEmail,
    WeakPassword,
    PasswordMismatch,
    MissingField(String),
    TooManyAttempts,
    InternalError,
}

impl RegistrationError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::WeakPassword => "WEAK_PASSWORD",
            Self::PasswordMismatch => "PASSWORD_MISMATCH",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            Self::EmailTaken => "Email is already registered".to_string(),
            Self::InvalidEmail => "Invalid email format".to_string(),
            Self::WeakPassword => {
                "Password must be 8-128 characters with at least one letter and one number"
                    .to_string()
            }
            Self::PasswordMismatch => "Passwords do not match".to_string(),
            Self::MissingField(field) => format!("Missing required field: {}", field),
            Self::TooManyAttempts => "Too many attempts, please try again later".to_string(),
            Self::InternalError => "An internal error occurred".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(&self.to_message())
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_code())
    }
}

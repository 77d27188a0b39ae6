use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Roles a token can carry. The set is closed; any other string in a token
/// payload fails deserialization and the token is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Admins and moderators both count as privileged for audit logging.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Admin | Self::Moderator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Claims embedded in every token issued by the server.
///
/// Verification is fully stateless: the signature and `exp` are checked and
/// nothing else is consulted, so a token stays usable until it expires.
/// A promoted or demoted user keeps the old `role` until they log in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user ID. Required; a payload without it never verifies.
    pub user_id: i64,

    /// Denormalized copy of the account email, for display only.
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub role: Role,

    /// Expiry (Unix timestamp, seconds). The token is invalid at or after
    /// this instant.
    pub exp: i64,

    /// Issued-at (Unix timestamp, seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    pub fn new(user_id: i64, email: Option<String>, role: Role, exp: i64) -> Self {
        Self {
            user_id,
            email,
            role,
            exp,
            iat: None,
        }
    }

    pub fn issued_at(mut self, iat: i64) -> Self {
        self.iat = Some(iat);
        self
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

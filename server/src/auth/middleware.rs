use hyper::StatusCode;
use hyper::header::HeaderMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(feature = "test-auth-bypass")]
use std::sync::Arc;

use shared::types::claims::{Claims, Role};
use shared::types::server_config::AuthConfig;
#[cfg(feature = "test-auth-bypass")]
use shared::types::server_config::AppEnv;

use crate::auth::token::{TokenError, TokenSigner};
#[cfg(feature = "test-auth-bypass")]
use crate::database::UserDirectory;
#[cfg(feature = "test-auth-bypass")]
use crate::handlers::http::utils::headers::get_header_value;
use crate::handlers::http::utils::headers::{get_bearer_token, get_cookie};
use crate::handlers::http::utils::json_response::{HttpResponse, deliver_error_json};

#[cfg(feature = "test-auth-bypass")]
pub const TEST_USER_HEADER: &str = "x-test-user-id";

/// Verified identity for the current request. Built per request and passed
/// to handlers by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    pub user_id: i64,
    pub email: Option<String>,
    pub role: Role,
    pub exp: i64,
}

impl From<Claims> for IdentityContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
            exp: claims.exp,
        }
    }
}

/// Request facts the audit log needs. Never holds credentials.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub client_ip: String,
    pub endpoint: String,
}

impl RequestMeta {
    pub fn new(client_ip: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("no credential supplied")]
    MissingCredential,

    #[error("credential rejected: {0}")]
    InvalidCredential(#[from] TokenError),

    #[error("insufficient privilege")]
    InsufficientPrivilege(&'static str),
}

impl AuthRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential | Self::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPrivilege(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Client-facing message. Verification detail stays in the logs.
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Authentication required",
            Self::InvalidCredential(_) => "Invalid or expired token",
            Self::InsufficientPrivilege(message) => *message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(e) => e.kind(),
            Self::InsufficientPrivilege(_) => "insufficient_privilege",
        }
    }

    pub fn to_response(&self) -> anyhow::Result<HttpResponse> {
        deliver_error_json(self.message(), self.status())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSource {
    Bearer,
    Cookie,
    LegacyCookie,
}

impl TokenSource {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::Cookie => "cookie",
            Self::LegacyCookie => "legacy_cookie",
        }
    }
}

/// Resolves the caller's identity from request headers.
#[derive(Clone)]
pub struct Authenticator {
    signer: TokenSigner,
    cookie_name: String,
    legacy_cookie_name: String,
    #[cfg(feature = "test-auth-bypass")]
    test_users: Option<Arc<dyn UserDirectory>>,
}

impl Authenticator {
    pub fn new(signer: TokenSigner, config: &AuthConfig) -> Self {
        Self {
            signer,
            cookie_name: config.cookie_name.clone(),
            legacy_cookie_name: config.legacy_cookie_name.clone(),
            #[cfg(feature = "test-auth-bypass")]
            test_users: None,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn legacy_cookie_name(&self) -> &str {
        &self.legacy_cookie_name
    }

    /// Arm the `X-Test-User-Id` header. Ignored unless `env` is `Test`.
    #[cfg(feature = "test-auth-bypass")]
    pub fn with_test_bypass(mut self, users: Arc<dyn UserDirectory>, env: AppEnv) -> Self {
        if env.is_test() {
            warn!(target: "audit", kind = "test_bypass_armed", "Test identity header is enabled");
            self.test_users = Some(users);
        }
        self
    }

    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        meta: &RequestMeta,
    ) -> Result<IdentityContext, AuthRejection> {
        #[cfg(feature = "test-auth-bypass")]
        if let Some(ctx) = self.test_identity(headers).await {
            return Ok(ctx);
        }

        let Some((source, token)) = self.extract_token(headers) else {
            let rejection = AuthRejection::MissingCredential;
            audit_failure(&rejection, meta);
            return Err(rejection);
        };

        match self.signer.verify(&token) {
            Ok(claims) => {
                debug!(
                    "Authenticated user {} via {} on {}",
                    claims.user_id,
                    source.as_str(),
                    meta.endpoint
                );
                Ok(IdentityContext::from(claims))
            }
            Err(e) => {
                let rejection = AuthRejection::InvalidCredential(e);
                audit_failure(&rejection, meta);
                Err(rejection)
            }
        }
    }

    /// First present source wins: bearer header, primary cookie, legacy cookie.
    fn extract_token(&self, headers: &HeaderMap) -> Option<(TokenSource, String)> {
        if let Some(token) = get_bearer_token(headers) {
            return Some((TokenSource::Bearer, token));
        }
        if let Some(token) = get_cookie(headers, &self.cookie_name) {
            return Some((TokenSource::Cookie, token));
        }
        get_cookie(headers, &self.legacy_cookie_name).map(|t| (TokenSource::LegacyCookie, t))
    }

    #[cfg(feature = "test-auth-bypass")]
    async fn test_identity(&self, headers: &HeaderMap) -> Option<IdentityContext> {
        let users = self.test_users.as_ref()?;
        let user_id: i64 = get_header_value(headers, TEST_USER_HEADER)?
            .trim()
            .parse()
            .ok()?;

        let user = match users.find_user_by_id(user_id).await {
            Ok(user) => user?,
            Err(e) => {
                warn!(target: "audit", kind = "test_bypass", user_id, "Test user lookup failed: {}", e);
                return None;
            }
        };
        warn!(target: "audit", kind = "test_bypass", user_id, "Identity taken from test header");

        Some(IdentityContext {
            user_id: user.id,
            email: Some(user.email),
            role: user.role,
            exp: crate::database::utils::get_timestamp()
                .saturating_add(i64::try_from(self.signer.ttl_secs()).unwrap_or(i64::MAX)),
        })
    }
}

fn audit_failure(rejection: &AuthRejection, meta: &RequestMeta) {
    warn!(
        target: "audit",
        kind = rejection.kind(),
        ip = %meta.client_ip,
        endpoint = %meta.endpoint,
        "Authentication failed"
    );
}

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use hyper::Request;

use shared::types::server_config::{AppConfig, AppEnv};

pub mod auth;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod security;

use auth::{Authenticator, TokenSigner};
use database::{SqliteUserDirectory, UserDirectory};
use handlers::http::utils::headers::get_client_ip;
use security::RateLimiter;

/// Everything a handler needs, cloned into each connection task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub signer: TokenSigner,
    pub authenticator: Authenticator,
    pub limiter: RateLimiter,
    pub users: Arc<dyn UserDirectory>,
}

impl AppState {
    /// Build state from a validated config: open the user database and
    /// insert any seed accounts it does not have yet.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let users = SqliteUserDirectory::open(&config.database.path)
            .await
            .with_context(|| {
                format!("Failed to open user database {}", config.database.path.display())
            })?;
        users
            .seed(&config.auth.seed_users)
            .await
            .context("Failed to seed user directory")?;
        Self::from_parts(config, Arc::new(users), AppEnv::from_env())
    }

    #[cfg_attr(not(feature = "test-auth-bypass"), allow(unused_variables))]
    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserDirectory>,
        env: AppEnv,
    ) -> Result<Self> {
        let secret = config
            .auth
            .jwt_secret
            .as_deref()
            .ok_or_else(|| anyhow!("JWT secret is not configured"))?;

        let signer = TokenSigner::new(secret, config.auth.token_expiry_secs());
        let authenticator = Authenticator::new(signer.clone(), &config.auth);

        #[cfg(feature = "test-auth-bypass")]
        let authenticator = authenticator.with_test_bypass(Arc::clone(&users), env);

        let limiter = RateLimiter::from_config(&config.rate_limit);

        Ok(Self {
            config: Arc::new(config),
            signer,
            authenticator,
            limiter,
            users,
        })
    }

    /// Rate-limit and audit origin for `req`, honouring forwarding headers
    /// only from `[server] trusted_proxies`.
    pub fn client_ip<B>(&self, req: &Request<B>) -> String {
        get_client_ip(req, &self.config.server.trusted_proxies)
    }
}

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Request, StatusCode};
use serde_json::json;
use tracing::info;

use shared::types::claims::Role;

use crate::AppState;
use crate::auth::IdentityContext;
use crate::handlers::http::utils::{HttpResponse, deliver_serialized_json};

/// GET /api/admin/stats: account counts and limiter settings.
pub async fn handle_stats(
    _req: Request<Bytes>,
    state: AppState,
    ctx: IdentityContext,
) -> Result<HttpResponse> {
    info!("Serving admin stats to user {}", ctx.user_id);

    let users = state
        .users
        .list_users()
        .await
        .context("Failed to load users for stats")?;
    let count = |role: Role| users.iter().filter(|u| u.role == role).count();

    let stats_json = json!({
        "success": true,
        "data": {
            "users": {
                "total":      users.len(),
                "admins":     count(Role::Admin),
                "moderators": count(Role::Moderator),
                "users":      count(Role::User),
            },
            "auth": {
                "token_expiry_minutes": state.config.auth.token_expiry_minutes,
            },
            "rate_limit": {
                "max_attempts": state.limiter.max_attempts(),
                "window_secs":  state.limiter.window_secs(),
            }
        }
    });

    deliver_serialized_json(&stats_json, StatusCode::OK)
}

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Request, StatusCode};
use serde_json::json;
use tracing::info;

use shared::types::login::UserSummary;

use crate::AppState;
use crate::auth::IdentityContext;
use crate::handlers::http::utils::{HttpResponse, deliver_serialized_json};

/// GET /api/admin/users. Password hashes never leave the directory.
pub async fn handle_list_users(
    _req: Request<Bytes>,
    state: AppState,
    ctx: IdentityContext,
) -> Result<HttpResponse> {
    let users: Vec<UserSummary> = state
        .users
        .list_users()
        .await
        .context("Failed to list users")?
        .iter()
        .map(|u| u.summary())
        .collect();

    info!("Listing {} users for admin {}", users.len(), ctx.user_id);

    deliver_serialized_json(&json!({"success": true, "users": users}), StatusCode::OK)
}

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Request, StatusCode, header};
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::handlers::http::utils::{HttpResponse, delete_cookie, deliver_serialized_json};

/// POST /api/auth/logout
///
/// Tokens are stateless, so logout only expires both auth cookies. A copied
/// token stays valid until its `exp`.
pub async fn handle_logout(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    let primary = delete_cookie(state.authenticator.cookie_name())
        .context("Failed to build cookie removal")?;
    let legacy = delete_cookie(state.authenticator.legacy_cookie_name())
        .context("Failed to build legacy cookie removal")?;

    info!("Logout from {}", state.client_ip(&req));

    let mut response = deliver_serialized_json(
        &json!({"success": true, "message": "Logged out"}),
        StatusCode::OK,
    )?;
    response.headers_mut().append(header::SET_COOKIE, primary);
    response.headers_mut().append(header::SET_COOKIE, legacy);
    Ok(response)
}

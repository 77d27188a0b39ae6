use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode};
use serde_json::json;

use crate::AppState;
use crate::auth::IdentityContext;
use crate::handlers::http::utils::{HttpResponse, deliver_serialized_json};

/// GET /api/auth/me
pub async fn handle_me(
    _req: Request<Bytes>,
    _state: AppState,
    ctx: IdentityContext,
) -> Result<HttpResponse> {
    deliver_serialized_json(&json!({"success": true, "user": ctx}), StatusCode::OK)
}

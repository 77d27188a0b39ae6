use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Request, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use shared::types::login::PasswordResetData;

use crate::AppState;
use crate::database::utils::normalize_email;
use crate::handlers::http::utils::{
    HttpResponse, deliver_error_json, deliver_serialized_json, deliver_too_many_attempts,
    read_form, read_json,
};

pub const PASSWORD_RESET_ACTION: &str = "password_reset";

pub const RESET_ACKNOWLEDGED: &str =
    "If an account exists for that address, reset instructions have been sent";

/// POST /api/auth/password-reset
///
/// The reply never reveals whether the address is registered. Mail delivery
/// is outside this service.
pub async fn handle_password_reset(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    let client_ip = state.client_ip(&req);

    let decision = state.limiter.check(PASSWORD_RESET_ACTION, &client_ip).await;
    if !decision.allowed {
        warn!(
            target: "audit",
            kind = "rate_limited",
            action = PASSWORD_RESET_ACTION,
            ip = %client_ip,
            "Password reset blocked"
        );
        return deliver_too_many_attempts(decision.retry_after_secs);
    }

    let email = read_json::<PasswordResetData>(&req)
        .map(|d| d.email)
        .or_else(|| read_form(req.body()).remove("email"))
        .map(|e| normalize_email(&e))
        .filter(|e| !e.is_empty());

    let Some(email) = email else {
        return deliver_error_json("Missing required field: email", StatusCode::BAD_REQUEST);
    };

    let user = state
        .users
        .find_user_by_email(&email)
        .await
        .context("Failed to look up account for password reset")?;

    if let Some(user) = user {
        info!(
            target: "audit",
            kind = "password_reset_requested",
            user_id = user.id,
            ip = %client_ip,
            "Password reset requested"
        );
    }

    deliver_serialized_json(
        &json!({"success": true, "message": RESET_ACKNOWLEDGED}),
        StatusCode::OK,
    )
}

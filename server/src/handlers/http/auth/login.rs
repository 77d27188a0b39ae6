use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Request, StatusCode, header};
use tracing::{error, info, warn};

use shared::types::login::{AuthSuccess, LoginData, LoginError};

use crate::AppState;
use crate::database::UserRecord;
use crate::database::utils::{normalize_email, verify_password};
use crate::handlers::http::utils::{
    HttpResponse, create_auth_cookie, create_session_cookie, deliver_serialized_json,
    deliver_too_many_attempts, form_flag, read_form, read_json,
};

pub const LOGIN_ACTION: &str = "login";

/// POST /api/auth/login
pub async fn handle_login(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    let client_ip = state.client_ip(&req);

    let decision = state.limiter.check(LOGIN_ACTION, &client_ip).await;
    if !decision.allowed {
        warn!(
            target: "audit",
            kind = "rate_limited",
            action = LOGIN_ACTION,
            ip = %client_ip,
            "Login attempt blocked"
        );
        return deliver_too_many_attempts(decision.retry_after_secs);
    }

    let login_data = match parse_login(&req) {
        Ok(data) => data,
        Err(login_error) => return deliver_login_error(&login_error),
    };

    let user = match attempt_login(&login_data, &state).await {
        Ok(user) => user,
        Err(login_error) => {
            warn!(
                target: "audit",
                kind = "login_failed",
                ip = %client_ip,
                reason = login_error.to_code(),
                "Login failed"
            );
            return deliver_login_error(&login_error);
        }
    };

    let (token, claims) = state
        .signer
        .issue_for(&user)
        .context("Failed to issue token")?;
    let ttl = state.signer.ttl_secs();

    let cookie_name = state.authenticator.cookie_name();
    let cookie = if login_data.remember_me {
        create_auth_cookie(cookie_name, &token, Duration::from_secs(ttl), true)
    } else {
        create_session_cookie(cookie_name, &token, true)
    }
    .context("Failed to create auth cookie")?;

    info!(
        target: "audit",
        kind = "login_succeeded",
        user_id = claims.user_id,
        role = %claims.role,
        ip = %client_ip,
        "User logged in"
    );

    let body = AuthSuccess::new("Login successful", token, ttl, user.summary());
    let mut response = deliver_serialized_json(&body, StatusCode::OK)?;
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// Accepts a JSON body or a urlencoded form.
fn parse_login(req: &Request<Bytes>) -> std::result::Result<LoginData, LoginError> {
    let data = match read_json::<LoginData>(req) {
        Some(data) => data,
        None => {
            let params = read_form(req.body());
            LoginData {
                email: params
                    .get("email")
                    .or_else(|| params.get("username"))
                    .cloned()
                    .ok_or_else(|| LoginError::MissingField("email".to_string()))?,
                password: params
                    .get("password")
                    .cloned()
                    .ok_or_else(|| LoginError::MissingField("password".to_string()))?,
                remember_me: form_flag(&params, "remember_me"),
            }
        }
    };

    if data.email.trim().is_empty() {
        return Err(LoginError::MissingField("email".to_string()));
    }
    if data.password.is_empty() {
        return Err(LoginError::MissingField("password".to_string()));
    }
    Ok(data)
}

async fn attempt_login(
    data: &LoginData,
    state: &AppState,
) -> std::result::Result<UserRecord, LoginError> {
    let user = state
        .users
        .find_user_by_email(&normalize_email(&data.email))
        .await
        .map_err(|e| {
            error!("User lookup failed: {}", e);
            LoginError::InternalError
        })?
        .ok_or(LoginError::InvalidCredentials)?;

    let hash = user.password_hash.clone();
    let password = data.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .map_err(|e| {
            error!("Password verification task failed: {}", e);
            LoginError::InternalError
        })?
        .map_err(|e| {
            error!("Stored hash for user {} is unusable: {}", user.id, e);
            LoginError::InternalError
        })?;

    if !valid {
        return Err(LoginError::InvalidCredentials);
    }
    Ok(user)
}

fn deliver_login_error(login_error: &LoginError) -> Result<HttpResponse> {
    deliver_serialized_json(&login_error.to_response(), login_error.status())
}

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Request, StatusCode, header};
use tracing::{error, info, warn};

use shared::types::claims::Role;
use shared::types::login::AuthSuccess;
use shared::types::register::{RegistrationData, RegistrationError};

use crate::AppState;
use crate::database::utils::{hash_password, is_strong_password, is_valid_email, normalize_email};
use crate::database::{DirectoryError, NewUser, UserRecord};
use crate::handlers::http::utils::{
    HttpResponse, create_auth_cookie, deliver_serialized_json, deliver_too_many_attempts,
    read_form, read_json,
};

pub const REGISTER_ACTION: &str = "register";

/// POST /api/auth/register
///
/// New accounts always get the `user` role; elevated roles come from seeding.
pub async fn handle_register(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    let client_ip = state.client_ip(&req);

    let decision = state.limiter.check(REGISTER_ACTION, &client_ip).await;
    if !decision.allowed {
        warn!(
            target: "audit",
            kind = "rate_limited",
            action = REGISTER_ACTION,
            ip = %client_ip,
            "Registration attempt blocked"
        );
        return deliver_too_many_attempts(decision.retry_after_secs);
    }

    let data = match parse_registration(&req).and_then(validate_registration) {
        Ok(data) => data,
        Err(reg_error) => {
            warn!("Registration rejected: {}", reg_error);
            return deliver_registration_error(&reg_error);
        }
    };

    let user = match create_user(data, &state).await {
        Ok(user) => user,
        Err(reg_error) => {
            warn!("Registration failed: {}", reg_error);
            return deliver_registration_error(&reg_error);
        }
    };

    let (token, _claims) = state
        .signer
        .issue_for(&user)
        .context("Failed to issue token")?;
    let ttl = state.signer.ttl_secs();
    let cookie = create_auth_cookie(
        state.authenticator.cookie_name(),
        &token,
        Duration::from_secs(ttl),
        true,
    )
    .context("Failed to create auth cookie")?;

    info!(
        target: "audit",
        kind = "registered",
        user_id = user.id,
        ip = %client_ip,
        "Account created"
    );

    let body = AuthSuccess::new("Registration successful", token, ttl, user.summary());
    let mut response = deliver_serialized_json(&body, StatusCode::CREATED)?;
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

fn parse_registration(
    req: &Request<Bytes>,
) -> std::result::Result<RegistrationData, RegistrationError> {
    if let Some(data) = read_json::<RegistrationData>(req) {
        return Ok(data);
    }

    let params = read_form(req.body());
    Ok(RegistrationData {
        email: params
            .get("email")
            .cloned()
            .ok_or_else(|| RegistrationError::MissingField("email".to_string()))?,
        password: params
            .get("password")
            .cloned()
            .ok_or_else(|| RegistrationError::MissingField("password".to_string()))?,
        confirm_password: params.get("confirm_password").cloned(),
    })
}

fn validate_registration(
    mut data: RegistrationData,
) -> std::result::Result<RegistrationData, RegistrationError> {
    data.email = normalize_email(&data.email);

    if data.email.is_empty() {
        return Err(RegistrationError::MissingField("email".to_string()));
    }
    if !is_valid_email(&data.email) {
        return Err(RegistrationError::InvalidEmail);
    }
    if !is_strong_password(&data.password) {
        return Err(RegistrationError::WeakPassword);
    }
    if let Some(confirm) = &data.confirm_password {
        if confirm != &data.password {
            return Err(RegistrationError::PasswordMismatch);
        }
    }
    Ok(data)
}

async fn create_user(
    data: RegistrationData,
    state: &AppState,
) -> std::result::Result<UserRecord, RegistrationError> {
    let existing = state
        .users
        .find_user_by_email(&data.email)
        .await
        .map_err(|e| {
            error!("User lookup failed during registration: {}", e);
            RegistrationError::InternalError
        })?;
    if existing.is_some() {
        return Err(RegistrationError::EmailTaken);
    }

    let password = data.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            error!("Password hashing task failed: {}", e);
            RegistrationError::InternalError
        })?
        .map_err(|e| {
            error!("{}", e);
            RegistrationError::InternalError
        })?;

    state
        .users
        .insert_user(NewUser {
            email: data.email,
            password_hash,
            role: Role::User,
        })
        .await
        .map_err(|e| match e {
            DirectoryError::EmailTaken => RegistrationError::EmailTaken,
            other => {
                error!("Failed to store new user: {}", other);
                RegistrationError::InternalError
            }
        })
}

fn deliver_registration_error(reg_error: &RegistrationError) -> Result<HttpResponse> {
    deliver_serialized_json(&reg_error.to_response(), reg_error.status())
}

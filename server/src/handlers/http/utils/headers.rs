use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Result, anyhow};
use hyper::Request;
use hyper::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

/// Extract a header value as a string
pub fn get_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract cookie value by name. Empty values count as absent.
pub fn get_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(hyper::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name.trim() == cookie_name && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
}

/// Set a cookie with options
pub fn set_cookie(
    name: &str,
    value: &str,
    max_age: Option<Duration>,
    path: Option<&str>,
    http_only: bool,
    secure: bool,
) -> Result<HeaderValue> {
    let mut cookie = format!("{}={}", name, value);

    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", age.as_secs()));
    }

    if let Some(p) = path {
        cookie.push_str(&format!("; Path={}", p));
    }

    if http_only {
        cookie.push_str("; HttpOnly");
    }

    if secure {
        cookie.push_str("; Secure");
    }

    cookie.push_str("; SameSite=Strict");

    debug!("Setting cookie: {}", name);

    HeaderValue::from_str(&cookie).map_err(|e| {
        warn!("Failed to create cookie header for {}: {}", name, e);
        anyhow!("Invalid cookie value: {}", e)
    })
}

/// Create a session cookie (expires when browser closes)
pub fn create_session_cookie(name: &str, value: &str, secure: bool) -> Result<HeaderValue> {
    set_cookie(name, value, None, Some("/"), true, secure)
}

/// Auth cookie that lives as long as the token it carries.
pub fn create_auth_cookie(
    name: &str,
    token: &str,
    max_age: Duration,
    secure: bool,
) -> Result<HeaderValue> {
    set_cookie(name, token, Some(max_age), Some("/"), true, secure)
}

/// Delete a cookie by setting it to expire. Carries the same attributes as
/// the auth cookies it replaces.
pub fn delete_cookie(name: &str) -> Result<HeaderValue> {
    debug!("Deleting cookie: {}", name);
    set_cookie(
        name,
        "",
        Some(Duration::from_secs(0)),
        Some("/"),
        true,
        true,
    )
}

/// Client origin used for rate limiting and audit logs.
///
/// The peer address the connection loop stored in the request extensions.
/// Only when that peer is one of `trusted_proxies` are `X-Forwarded-For`
/// (rightmost hop that is not itself a trusted proxy) and then `X-Real-IP`
/// consulted. Without a peer address the origin is `unknown`.
pub fn get_client_ip<B>(req: &Request<B>, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = req.extensions().get::<SocketAddr>().map(SocketAddr::ip) else {
        return "unknown".to_string();
    };

    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    if let Some(forwarded) = get_header_value(req.headers(), "x-forwarded-for") {
        if let Some(client) = forwarded_client(&forwarded, trusted_proxies) {
            return client.to_string();
        }
    }

    if let Some(real_ip) = get_header_value(req.headers(), "x-real-ip") {
        if let Ok(ip) = real_ip.trim().parse::<IpAddr>() {
            return ip.to_string();
        }
    }

    peer.to_string()
}

/// Walk the hop list from the nearest proxy outwards and return the first
/// address that is not a trusted proxy. Stops at an unparsable entry.
fn forwarded_client(header: &str, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    for hop in header.rsplit(',').map(str::trim).filter(|s| !s.is_empty()) {
        let ip = hop.parse::<IpAddr>().ok()?;
        if !trusted_proxies.contains(&ip) {
            return Some(ip);
        }
    }
    None
}

/// Extract bearer token from Authorization header
/// Format: "Authorization: Bearer <token>"
pub fn get_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = get_header_value(headers, "authorization")?;
    let (scheme, token) = auth.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// True when the request declares a urlencoded form body.
pub fn is_form_request(headers: &HeaderMap) -> bool {
    get_header_value(headers, "content-type")
        .map(|ct| {
            ct.to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

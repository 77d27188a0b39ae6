use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use std::convert::Infallible;
use tracing::debug;

use shared::types::json_error::ErrorResponse;

pub type HttpResponse = Response<BoxBody<Bytes, Infallible>>;

/// Helper function to create a full body from various types
pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, Infallible> {
    Full::new(chunk.into()).boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
/// This is the primary helper all handlers should use instead of
/// writing their own one-off serialization + response-building blocks.
pub fn deliver_serialized_json<T: Serialize>(data: &T, status: StatusCode) -> Result<HttpResponse> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!(
        "Delivering serialized JSON response, size: {} bytes",
        json.len()
    );

    let response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-store")
        .body(full(json))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))?;

    Ok(response)
}

/// `{"success":false,"message":...}` with the given status.
pub fn deliver_error_json(message: &str, status: StatusCode) -> Result<HttpResponse> {
    debug!("Delivering error JSON: {} ({})", status.as_u16(), message);
    deliver_serialized_json(&ErrorResponse::new(message), status)
}

pub const TOO_MANY_ATTEMPTS: &str = "Too many attempts, please try again later";

/// 429 with the standard envelope and, when known, `Retry-After`.
pub fn deliver_too_many_attempts(retry_after_secs: Option<u64>) -> Result<HttpResponse> {
    let mut response = deliver_error_json(TOO_MANY_ATTEMPTS, StatusCode::TOO_MANY_REQUESTS)?;
    if let Some(secs) = retry_after_secs {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, header::HeaderValue::from(secs));
    }
    Ok(response)
}

/// Last-resort 500 that cannot fail.
pub fn internal_error() -> HttpResponse {
    let body = r#"{"success":false,"message":"Internal server error"}"#;
    let mut response = Response::new(full(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(res: HttpResponse) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn error_envelope_shape() {
        let res = deliver_error_json("Authentication required", StatusCode::UNAUTHORIZED).unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let v: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["message"], "Authentication required");
    }

    #[tokio::test]
    async fn too_many_attempts_sets_retry_after() {
        let res = deliver_too_many_attempts(Some(42)).unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get(header::RETRY_AFTER).unwrap(), "42");
        assert!(body_string(res).await.contains(TOO_MANY_ATTEMPTS));

        let res = deliver_too_many_attempts(None).unwrap();
        assert!(res.headers().get(header::RETRY_AFTER).is_none());
    }

    #[tokio::test]
    async fn internal_error_is_generic() {
        let res = internal_error();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(res).await.contains("Internal server error"));
    }
}

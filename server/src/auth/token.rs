use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use shared::types::claims::Claims;

use crate::auth::codec::{decode_segment, encode_segment};
use crate::database::UserRecord;
use crate::database::utils::get_timestamp;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("failed to encode token: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid signing key: {0}")]
    Key(String),
}

impl TokenError {
    /// Short, non-sensitive label for audit logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::Encoding(_) => "encoding",
            Self::Key(_) => "key",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Issues and verifies HS256 tokens with a process-wide secret.
///
/// Cheap to clone; all clones share the same key.
#[derive(Clone)]
pub struct TokenSigner {
    inner: Arc<SignerInner>,
}

struct SignerInner {
    secret: Vec<u8>,
    ttl_secs: u64,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.inner.ttl_secs)
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl_secs: u64) -> Self {
        Self {
            inner: Arc::new(SignerInner {
                secret: secret.as_ref().to_vec(),
                ttl_secs,
            }),
        }
    }

    /// Lifetime of tokens produced by [`issue_for`](Self::issue_for).
    pub fn ttl_secs(&self) -> u64 {
        self.inner.ttl_secs
    }

    /// Sign `claims` as `header.payload.signature`.
    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        };

        let header_seg = encode_segment(&serde_json::to_vec(&header)?);
        let payload_seg = encode_segment(&serde_json::to_vec(claims)?);
        let signing_input = format!("{}.{}", header_seg, payload_seg);
        let signature = self.sign(signing_input.as_bytes())?;

        Ok(format!("{}.{}", signing_input, encode_segment(&signature)))
    }

    /// Build fresh claims for `user` and sign them. Returns the token together
    /// with the claims it carries.
    pub fn issue_for(&self, user: &UserRecord) -> Result<(String, Claims), TokenError> {
        self.issue_for_at(user, get_timestamp())
    }

    pub fn issue_for_at(&self, user: &UserRecord, now: i64) -> Result<(String, Claims), TokenError> {
        let claims = Claims::new(
            user.id,
            Some(user.email.clone()),
            user.role,
            now.saturating_add(i64::try_from(self.inner.ttl_secs).unwrap_or(i64::MAX)),
        )
        .issued_at(now);

        let token = self.issue(&claims)?;
        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, get_timestamp())
    }

    /// Verify `token` against an explicit clock. Never panics on hostile input.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_seg, payload_seg, signature_seg] = parts.as_slice() else {
            return Err(TokenError::Malformed("expected three segments"));
        };

        let header: TokenHeader = serde_json::from_slice(&decode_segment(header_seg))
            .map_err(|_| TokenError::Malformed("header is not valid JSON"))?;
        let payload: serde_json::Value = serde_json::from_slice(&decode_segment(payload_seg))
            .map_err(|_| TokenError::Malformed("payload is not valid JSON"))?;

        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signing_input = format!("{}.{}", header_seg, payload_seg);
        let expected = self.sign(signing_input.as_bytes())?;
        let supplied = decode_segment(signature_seg);

        if !bool::from(expected.as_slice().ct_eq(supplied.as_slice())) {
            return Err(TokenError::BadSignature);
        }

        let claims: Claims = serde_json::from_value(payload)
            .map_err(|_| TokenError::Malformed("payload is missing required claims"))?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.inner.secret)
            .map_err(|e| TokenError::Key(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

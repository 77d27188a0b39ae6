use serde::{Deserialize, Serialize};

/// Standard failure envelope: `{"success": false, "message": "..."}`.
///
/// Every denial the middleware emits uses this shape, as do handler errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

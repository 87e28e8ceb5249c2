//! Error response body and tracking IDs.

use rand::rngs::OsRng;
use rand::TryRngCore;
use serde::{Deserialize, Serialize};

/// Tracking ID used when the OS random source is unavailable.
pub const ERROR_ID_FALLBACK: &str = "error-generating-id";

/// JSON body written for taxonomy errors.
///
/// ```json
/// {"code": 500, "message": "An internal error occurred", "id": "9f86d081884c7d65"}
/// ```
///
/// `id` is only present for internal errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code.
    pub code: u16,
    /// User-visible message.
    pub message: String,
    /// Tracking ID correlating the response with a server log entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ErrorResponse {
    /// Creates a body without a tracking ID.
    #[must_use]
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            id: None,
        }
    }

    /// Attaches a tracking ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Generates a 16-hex-character tracking ID from the OS random source.
///
/// Falls back to [`ERROR_ID_FALLBACK`] if the random source fails.
#[must_use]
pub fn generate_error_id() -> String {
    let mut bytes = [0u8; 8];
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        return ERROR_ID_FALLBACK.to_string();
    }

    hex::encode(bytes)
}

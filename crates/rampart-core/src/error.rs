//! Error taxonomy for rampart.
//!
//! [`AppError`] is the closed set of errors a request can end with. Every
//! variant maps to exactly one HTTP status through [`ErrorKind`], and the
//! responder matches on it exhaustively.
//!
//! | Variant | Status | `error_type()` |
//! |---|---|---|
//! | `Validation` | 400 | `validation_error` |
//! | `Auth` | 401 | `auth_error` |
//! | `NotFound` | 404 | `not_found_error` |
//! | `Payment` | 400 | `payment_error` |
//! | `Internal` | 500 | none |
//!
//! Anything that is not one of the four concrete variants enters the
//! taxonomy as `Internal` through `From<anyhow::Error>`.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Public message shown in place of an internal error's text.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Result type alias using [`AppError`].
pub type AppResult<T> = Result<T, AppError>;

/// Variant tag of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client-supplied input was rejected.
    Validation,
    /// Missing or insufficient credentials.
    Auth,
    /// Addressed resource is absent.
    NotFound,
    /// Payment processing failed.
    Payment,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Validation | Self::Payment => StatusCode::BAD_REQUEST,
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Standard error type for rampart.
///
/// # Example
///
/// ```
/// use rampart_core::AppError;
/// use http::StatusCode;
///
/// let err = AppError::payment("Payment failed", "CARD_DECLINED");
/// assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
/// assert_eq!(err.message(), "Payment failed");
/// assert_eq!(err.payment_code(), Some("CARD_DECLINED"));
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Request input was rejected.
    #[error("{message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Authentication or privilege check failed.
    #[error("{message}")]
    Auth {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("{message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Payment processing failed.
    #[error("{message}")]
    Payment {
        /// Human-readable error message.
        message: String,
        /// Machine sub-code such as `CARD_DECLINED`. Never part of the message.
        code: String,
    },

    /// Any error outside the taxonomy. Its text is never shown to clients.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a payment error with its machine sub-code.
    #[must_use]
    pub fn payment(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Payment {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Wraps any error as an internal error.
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        Self::Internal(source.into())
    }

    /// Creates an internal error from a plain message.
    #[must_use]
    pub fn internal_msg(message: impl Into<String>) -> Self {
        Self::Internal(anyhow::Error::msg(message.into()))
    }

    /// Returns the variant tag.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Payment { .. } => ErrorKind::Payment,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Returns the user-visible message.
    ///
    /// Concrete variants return their construction string unchanged.
    /// `Internal` returns [`INTERNAL_ERROR_MESSAGE`].
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::Auth { message }
            | Self::NotFound { message }
            | Self::Payment { message, .. } => message,
            Self::Internal(_) => INTERNAL_ERROR_MESSAGE,
        }
    }

    /// Returns the metrics label for taxonomy errors.
    ///
    /// `Internal` has no label; callers fall back to the error text.
    #[must_use]
    pub const fn error_type(&self) -> Option<&'static str> {
        match self {
            Self::Validation { .. } => Some("validation_error"),
            Self::Auth { .. } => Some("auth_error"),
            Self::NotFound { .. } => Some("not_found_error"),
            Self::Payment { .. } => Some("payment_error"),
            Self::Internal(_) => None,
        }
    }

    /// Returns the payment sub-code, if this is a payment error.
    #[must_use]
    pub fn payment_code(&self) -> Option<&str> {
        match self {
            Self::Payment { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` for errors outside the concrete taxonomy.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

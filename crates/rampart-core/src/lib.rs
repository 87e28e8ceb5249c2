//! # Rampart Core
//!
//! Core types shared by every rampart crate:
//!
//! - [`AppError`] - The closed error taxonomy rendered by the responder
//! - [`ErrorKind`] - Variant tag with its fixed HTTP status mapping
//! - [`ErrorResponse`] - JSON body written for taxonomy errors
//! - [`Principal`] - Capabilities of the identity attached upstream
//! - [`generate_error_id`] - Tracking IDs for internal errors

#![doc(html_root_url = "https://docs.rs/rampart-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod identity;
mod response;

pub use error::{AppError, AppResult, ErrorKind, INTERNAL_ERROR_MESSAGE};
pub use identity::{Principal, SimplePrincipal};
pub use response::{generate_error_id, ErrorResponse, ERROR_ID_FALLBACK};

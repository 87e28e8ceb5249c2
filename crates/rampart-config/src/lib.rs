//! Typed configuration for the rampart control plane.
//!
//! Configuration is layered: defaults → TOML or JSON file → environment
//! variables. Every section rejects unknown fields.
//!
//! # Example
//!
//! ```no_run
//! use rampart_config::ConfigLoader;
//!
//! # fn main() -> Result<(), rampart_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_file("rampart.toml")?
//!     .with_env_prefix("RAMPART")
//!     .load()?;
//!
//! println!("Login limit: {}", config.rate_limit.login.limit);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [logging]
//! file = "/var/log/shop.log"
//! level = "warn"
//! format = "json"
//!
//! [metrics]
//! cleanup_interval_secs = 3600
//! max_age_secs = 604800
//!
//! [rate_limit]
//! enabled = true
//! login = { limit = 5, window_secs = 60 }
//! password_reset = { limit = 3, window_secs = 3600 }
//! webhook = { limit = 10, window_secs = 60 }
//!
//! [responder]
//! test_mode = false
//! error_template = "partials/error.templ"
//!
//! [webhook]
//! route = "/webhook"
//! capture_limit = 4096
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `RAMPART__LOGGING__FILE=/var/log/shop.log`
//! - `RAMPART__RATE_LIMIT__LOGIN__LIMIT=10`
//! - `RAMPART__RESPONDER__TEST_MODE=true`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;

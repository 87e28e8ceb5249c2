//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{ConfigError, LogFormat, RampartConfig, RateLimitRule};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use rampart_config::ConfigLoader;
///
/// # fn main() -> Result<(), rampart_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("rampart.toml")?
///     .with_env_prefix("RAMPART")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: RampartConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = RampartConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = RampartConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = Self::parse_file(&content, path)?;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use rampart_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[responder]\ntest_mode = true", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(config.responder.test_mode);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the current directory or its parents, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if a `.env` file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<RampartConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> RampartConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<RampartConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with(&marker))
            .collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["LOGGING", "FILE"] => {
                config.logging.file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            ["LOGGING", "LEVEL"] => {
                config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "DIAGNOSTICS"] => {
                config.logging.diagnostics = parse_bool_var(key, value)?;
            }

            ["METRICS", "CLEANUP_INTERVAL_SECS"] => {
                config.metrics.cleanup_interval_secs = parse_number(key, value)?;
            }
            ["METRICS", "MAX_AGE_SECS"] => {
                config.metrics.max_age_secs = parse_number(key, value)?;
            }

            ["RATE_LIMIT", "ENABLED"] => {
                config.rate_limit.enabled = parse_bool_var(key, value)?;
            }
            ["RATE_LIMIT", "HEADERS"] => {
                config.rate_limit.headers = parse_bool_var(key, value)?;
            }
            ["RATE_LIMIT", "SWEEP_EVERY"] => {
                config.rate_limit.sweep_every = parse_number(key, value)?;
            }
            ["RATE_LIMIT", preset, field] => {
                let rule = match *preset {
                    "LOGIN" => &mut config.rate_limit.login,
                    "PASSWORD_RESET" => &mut config.rate_limit.password_reset,
                    "WEBHOOK" => &mut config.rate_limit.webhook,
                    _ => return Ok(()),
                };
                apply_rule_field(rule, field, key, value)?;
            }

            ["RESPONDER", "TEST_MODE"] => {
                config.responder.test_mode = parse_bool_var(key, value)?;
            }
            ["RESPONDER", "ERROR_TEMPLATE"] => {
                config.responder.error_template = value.to_string();
            }

            ["WEBHOOK", "ROUTE"] => {
                config.webhook.route = value.to_string();
            }
            ["WEBHOOK", "CAPTURE_LIMIT"] => {
                config.webhook.capture_limit = parse_number(key, value)?;
            }
            ["WEBHOOK", "UNHEALTHY_BELOW_PERCENT"] => {
                config.webhook.unhealthy_below_percent = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected float"))?;
            }
            ["WEBHOOK", "STALE_AFTER_SECS"] => {
                config.webhook.stale_after_secs = parse_number(key, value)?;
            }

            _ => {}
        }

        Ok(())
    }
}

fn apply_rule_field(
    rule: &mut RateLimitRule,
    field: &str,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match field {
        "LIMIT" => rule.limit = parse_number(key, value)?,
        "WINDOW_SECS" => rule.window_secs = parse_number(key, value)?,
        _ => {}
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, RampartConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.responder.test_mode);
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_toml() {
        let toml = r#"
            [rate_limit]
            login = { limit = 8, window_secs = 120 }
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.rate_limit.login.limit, 8);
        assert_eq!(config.rate_limit.login.window_secs, 120);
        assert_eq!(config.rate_limit.webhook.limit, 10);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"webhook": {"capture_limit": 1024}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.webhook.capture_limit, 1024);
        assert_eq!(config.webhook.route, "/webhook");
    }

    #[test]
    fn test_loader_unsupported_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_unknown_section_rejected() {
        let result = ConfigLoader::new().with_string("[server]\nport = 1", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/rampart.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/rampart.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, RampartConfig::default());
    }

    #[test]
    fn test_loader_invalid_values_fail_load() {
        let result = ConfigLoader::new()
            .with_string("[rate_limit]\nlogin = { limit = 0, window_secs = 60 }", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_apply_env_var_logging() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__FILE", "/var/log/shop.log", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__FORMAT", "pretty", "TEST").unwrap();
        assert_eq!(loader.config.logging.file, Some(PathBuf::from("/var/log/shop.log")));
        assert_eq!(loader.config.logging.format, LogFormat::Pretty);

        loader.apply_env_var("TEST__LOGGING__FILE", "", "TEST").unwrap();
        assert_eq!(loader.config.logging.file, None);
    }

    #[test]
    fn test_apply_env_var_rate_limit_rule() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__RATE_LIMIT__LOGIN__LIMIT", "20", "TEST").unwrap();
        loader.apply_env_var("TEST__RATE_LIMIT__WEBHOOK__WINDOW_SECS", "30", "TEST").unwrap();
        assert_eq!(loader.config.rate_limit.login.limit, 20);
        assert_eq!(loader.config.rate_limit.webhook.window_secs, 30);
    }

    #[test]
    fn test_apply_env_var_boolean() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__RESPONDER__TEST_MODE", "yes", "TEST").unwrap();
        assert!(loader.config.responder.test_mode);
    }

    #[test]
    fn test_apply_env_var_invalid_integer() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("TEST__WEBHOOK__CAPTURE_LIMIT", "lots", "TEST");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__NOPE__X", "1", "TEST").unwrap();
        loader.apply_env_var("TEST__RATE_LIMIT__SIGNUP__LIMIT", "1", "TEST").unwrap();
        assert_eq!(loader.config, RampartConfig::default());
    }
}

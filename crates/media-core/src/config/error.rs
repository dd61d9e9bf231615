//! Configuration error types
//!
//! This module provides the error types for configuration management.

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("invalid configuration value for {key}: {value} (expected {expected})")]
    InvalidValue { key: String, value: String, expected: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("parsing error: {0}")]
    ParseError(String),

    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Build an [`EnvVarNotFound`](ConfigError::EnvVarNotFound), optionally
    /// noting what else was tried (e.g. a config file key).
    pub fn env_var_not_found(key: &str, tried_also: Option<&str>) -> Self {
        match tried_also {
            Some(other) => ConfigError::EnvVarNotFound(format!("{key} (also tried {other})")),
            None => ConfigError::EnvVarNotFound(key.to_string()),
        }
    }

    /// Build a [`ParseError`](ConfigError::ParseError) with source context.
    pub fn parse_error(message: impl Into<String>, source: &str, key: &str) -> Self {
        ConfigError::ParseError(format!("{} (from {source}, key {key})", message.into()))
    }

    /// Build a [`ValidationFailed`](ConfigError::ValidationFailed), folding
    /// category/suggestion/field detail into the message text.
    pub fn validation_failed(
        message: impl Into<String>,
        category: &str,
        suggestion: &str,
        fields: Vec<(String, String)>,
    ) -> Self {
        let field_detail = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        ConfigError::ValidationFailed(format!(
            "{} [{category}] ({field_detail}) — {suggestion}",
            message.into()
        ))
    }

    /// Build an [`InvalidValue`](ConfigError::InvalidValue).
    pub fn invalid_value(key: &str, value: &str, expected: &str, _context: &str) -> Self {
        ConfigError::InvalidValue { key: key.to_string(), value: value.to_string(), expected: expected.to_string() }
    }
}

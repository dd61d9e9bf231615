//! Configuration validation utilities
//!
//! This module provides validation helpers for configuration values.

use crate::config::{ConfigError, ConfigResult};

/// Validate URL format
pub fn validate_url(url: &str, field_name: &str) -> ConfigResult<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::ValidationFailed(
            format!("{} must be a valid HTTP(S) URL", field_name)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(validate_url("https://example.com", "url").is_ok());
        assert!(validate_url("http://example.com", "url").is_ok());
        assert!(validate_url("ftp://example.com", "url").is_err());
        assert!(validate_url("example.com", "url").is_err());
    }
}

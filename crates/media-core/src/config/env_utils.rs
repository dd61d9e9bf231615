//! Environment configuration utilities
//!
//! Type conversion and default-value handling for environment variables,
//! used by [`crate::config::AppConfig::from_env`].

use std::env;
use std::str::FromStr;
use crate::config::{ConfigError, ConfigResult};

/// Environment variable loader with type conversion and validation
pub struct EnvLoader;

impl EnvLoader {
    /// Load an optional environment variable with a default value
    pub fn load_with_default<T>(key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Clone,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => value.parse()
                .map_err(|e| ConfigError::parse_error(
                    format!("{}: {}", key, e),
                    "environment variable",
                    key
                )),
            Err(_) => Ok(default),
        }
    }

    /// Load a duration in seconds
    pub fn load_duration_seconds(key: &str, default_seconds: u64) -> ConfigResult<std::time::Duration> {
        let seconds = Self::load_with_default(key, default_seconds)?;
        Ok(std::time::Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_loader_with_default() {
        env::set_var("TEST_DEFAULT", "100");
        let result: ConfigResult<i32> = EnvLoader::load_with_default("TEST_DEFAULT", 50);
        assert_eq!(result.unwrap(), 100);

        env::remove_var("TEST_DEFAULT");
        let result: ConfigResult<i32> = EnvLoader::load_with_default("TEST_DEFAULT", 50);
        assert_eq!(result.unwrap(), 50);
    }

    #[test]
    #[serial]
    fn test_env_loader_duration_seconds() {
        env::remove_var("TEST_DURATION_SECONDS");
        let result = EnvLoader::load_duration_seconds("TEST_DURATION_SECONDS", 7);
        assert_eq!(result.unwrap(), std::time::Duration::from_secs(7));

        env::set_var("TEST_DURATION_SECONDS", "30");
        let result = EnvLoader::load_duration_seconds("TEST_DURATION_SECONDS", 7);
        assert_eq!(result.unwrap(), std::time::Duration::from_secs(30));
        env::remove_var("TEST_DURATION_SECONDS");
    }
}

//! Environment-variable configuration, loaded once at startup.
//!
//! Matches spec.md's config model: no CLI flags affect core behavior, a
//! missing required peer URL is a startup failure, and everything else
//! has a sane default so local development only needs `DATABASE_URL`.

pub mod error;
pub mod env_utils;
pub mod validation;

pub use error::{ConfigError, ConfigResult};

use env_utils::EnvLoader;
use std::env;

/// Top-level configuration for the `media-app` binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub http: HttpConfig,
    pub collaborators: CollaboratorConfig,
    pub engine: EngineConfig,
}

/// HTTP server bind settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// URLs for the saga's three external collaborators. All three are
/// required: a missing one is a startup failure, matching spec.md §6.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub media_command_url: String,
    pub album_service_url: String,
    pub notification_service_url: String,
}

/// Tunables for the projector loop(s), saga engine loop, and stuck-saga
/// detector. Defaults match the intervals spec.md names explicitly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub projector_poll_interval: std::time::Duration,
    pub saga_poll_interval: std::time::Duration,
    pub stuck_saga_check_interval: std::time::Duration,
    pub stuck_saga_threshold: std::time::Duration,
    pub collaborator_call_timeout: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            projector_poll_interval: std::time::Duration::from_secs(2),
            saga_poll_interval: std::time::Duration::from_secs(3),
            stuck_saga_check_interval: std::time::Duration::from_secs(60),
            stuck_saga_threshold: std::time::Duration::from_secs(5 * 60),
            collaborator_call_timeout: std::time::Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables. `dotenvy` should be
    /// applied by the caller before this runs, so a local `.env` can
    /// supply values without exporting them into the shell.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").map_err(|_| ConfigError::EnvVarNotFound("DATABASE_URL".to_string()))?,
            http: HttpConfig {
                host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: EnvLoader::load_with_default("HTTP_PORT", 8080u16)?,
            },
            collaborators: CollaboratorConfig {
                media_command_url: env::var("MEDIA_COMMAND_URL")
                    .map_err(|_| ConfigError::EnvVarNotFound("MEDIA_COMMAND_URL".to_string()))?,
                album_service_url: env::var("ALBUM_SERVICE_URL")
                    .map_err(|_| ConfigError::EnvVarNotFound("ALBUM_SERVICE_URL".to_string()))?,
                notification_service_url: env::var("NOTIFICATION_SERVICE_URL")
                    .map_err(|_| ConfigError::EnvVarNotFound("NOTIFICATION_SERVICE_URL".to_string()))?,
            },
            engine: EngineConfig {
                projector_poll_interval: EnvLoader::load_duration_seconds("PROJECTOR_POLL_INTERVAL_SECONDS", 2)?,
                saga_poll_interval: EnvLoader::load_duration_seconds("SAGA_POLL_INTERVAL_SECONDS", 3)?,
                stuck_saga_check_interval: EnvLoader::load_duration_seconds("STUCK_SAGA_CHECK_INTERVAL_SECONDS", 60)?,
                stuck_saga_threshold: EnvLoader::load_duration_seconds("STUCK_SAGA_THRESHOLD_SECONDS", 300)?,
                collaborator_call_timeout: EnvLoader::load_duration_seconds("COLLABORATOR_CALL_TIMEOUT_SECONDS", 10)?,
            },
        })
    }

    /// Validate cross-field constraints beyond "did it parse".
    pub fn validate(&self) -> ConfigResult<()> {
        validation::validate_url(&self.collaborators.media_command_url, "MEDIA_COMMAND_URL")?;
        validation::validate_url(&self.collaborators.album_service_url, "ALBUM_SERVICE_URL")?;
        validation::validate_url(&self.collaborators.notification_service_url, "NOTIFICATION_SERVICE_URL")?;
        if self.http.port == 0 {
            return Err(ConfigError::ValidationFailed("HTTP_PORT must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_vars() {
        env::set_var("DATABASE_URL", "postgres://localhost/media");
        env::set_var("MEDIA_COMMAND_URL", "http://localhost:9001");
        env::set_var("ALBUM_SERVICE_URL", "http://localhost:9002");
        env::set_var("NOTIFICATION_SERVICE_URL", "http://localhost:9003");
    }

    #[test]
    #[serial]
    fn loads_with_defaults_when_optional_vars_absent() {
        set_required_vars();
        env::remove_var("HTTP_PORT");
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.engine.saga_poll_interval, std::time::Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn missing_collaborator_url_is_startup_failure() {
        set_required_vars();
        env::remove_var("ALBUM_SERVICE_URL");
        assert!(AppConfig::from_env().is_err());
        env::set_var("ALBUM_SERVICE_URL", "http://localhost:9002");
    }

    #[test]
    #[serial]
    fn rejects_non_http_collaborator_url() {
        set_required_vars();
        env::set_var("ALBUM_SERVICE_URL", "not-a-url");
        let config = AppConfig::from_env().unwrap();
        assert!(config.validate().is_err());
        env::set_var("ALBUM_SERVICE_URL", "http://localhost:9002");
    }
}

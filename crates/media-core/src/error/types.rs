//! Error types for the media coordination core.
//!
//! All errors raised by the event log, projector, and saga engine are
//! variants of [`CoreError`]. Variants are grouped by effect (per
//! [`crate::error::ErrorCategory`]) rather than by subsystem, so a caller
//! can dispatch on "is this retryable" without matching every variant.

/// Primary error type for event log, projector, and saga engine operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The request itself is malformed (missing/invalid field, unknown
    /// aggregate type, negative version, etc). Never retried.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of what made the request invalid.
        message: String,
    },

    /// An `Append` targeted a `(aggregate_id, version)` pair that already
    /// exists. The caller is expected to re-read the latest version and
    /// retry with a fresh one.
    #[error("version conflict for aggregate {aggregate_id}: expected next version {expected}, got {actual}")]
    VersionConflict {
        /// Aggregate the conflicting append targeted.
        aggregate_id: String,
        /// Version the log expected next.
        expected: i64,
        /// Version the caller supplied.
        actual: i64,
    },

    /// Looked up an aggregate, saga, or saga step that doesn't exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was being looked up.
        message: String,
    },

    /// Database operation failure (connection, query, pool exhaustion).
    #[error("database error: {message}")]
    Database {
        /// Underlying database error text.
        message: String,
    },

    /// Outbound call to a saga collaborator (process/album/notification
    /// service) failed.
    #[error("collaborator call to {service} failed: {message}")]
    Collaborator {
        /// Name of the external service that was called.
        service: String,
        /// Error details.
        message: String,
        /// HTTP status code, if one was returned.
        status_code: Option<u16>,
    },

    /// JSON (de)serialization failure on an event payload or saga payload.
    #[error("serialization error: {message}")]
    Serialization {
        /// Details about the failure.
        message: String,
    },

    /// Saga or projector configuration is invalid (e.g. a saga step with
    /// no compensation, or a missing required environment variable).
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the misconfiguration.
        message: String,
    },

    /// A circuit breaker is open and is rejecting calls.
    #[error("circuit breaker open for {service}")]
    CircuitOpen {
        /// Service the circuit breaker is protecting.
        service: String,
    },

    /// Catch-all for failures that don't fit another variant.
    #[error("internal error: {message}")]
    Internal {
        /// Details about the failure.
        message: String,
    },
}

impl CoreError {
    /// Build a [`CoreError::InvalidRequest`] from anything `Display`-able.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        CoreError::InvalidRequest { message: message.into() }
    }

    /// Build a [`CoreError::NotFound`] from anything `Display`-able.
    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound { message: message.into() }
    }

    /// Build a [`CoreError::Database`] from anything `Display`-able.
    ///
    /// Mirrors the `_simple` convenience constructors the rest of this
    /// crate's tests rely on for building errors without the full struct
    /// literal.
    pub fn database_simple(message: impl Into<String>) -> Self {
        CoreError::Database { message: message.into() }
    }

    /// Build a [`CoreError::Collaborator`] without a status code.
    pub fn collaborator_simple(service: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Collaborator {
            service: service.into(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Build an [`CoreError::Internal`] from anything `Display`-able.
    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal { message: message.into() }
    }
}

#[cfg(feature = "database")]
impl From<diesel::result::Error> for CoreError {
    fn from(error: diesel::result::Error) -> Self {
        CoreError::Database { message: error.to_string() }
    }
}

#[cfg(feature = "database")]
impl From<diesel::r2d2::PoolError> for CoreError {
    fn from(error: diesel::r2d2::PoolError) -> Self {
        CoreError::Database { message: error.to_string() }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(error: reqwest::Error) -> Self {
        CoreError::Collaborator {
            service: error.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string()),
            message: error.to_string(),
            status_code: error.status().map(|s| s.as_u16()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        CoreError::Serialization { message: error.to_string() }
    }
}

#[cfg(feature = "monitoring")]
impl From<prometheus::Error> for CoreError {
    fn from(error: prometheus::Error) -> Self {
        CoreError::Internal { message: format!("metrics error: {error}") }
    }
}

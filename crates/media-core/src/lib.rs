//! # Media Core
//!
//! Shared primitives used by the event log, projector, and saga engine:
//! - [`error`]: error taxonomy by effect, retry/backoff, circuit breaker
//! - [`auth`]: bearer token decode shim for the HTTP surface
//! - [`config`]: environment-variable configuration, loaded once at startup
//!
//! ## Features
//!
//! - `database` - Enables `From<diesel::...>` conversions on [`error::CoreError`]
//! - `monitoring` - Enables Prometheus metrics integration
//!
//! ## Core Concepts
//!
//! This crate holds no event/saga domain types itself (those live in
//! `media-store`); it is the ambient layer every other crate depends on for
//! consistent error handling, resilience, and configuration.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod auth;
pub mod config;

pub use error::{CoreError, Result, ErrorCategory, ErrorSeverity, ErrorExt};
pub use auth::{BearerDecoder, Claims, JwtError};
pub use config::{AppConfig, ConfigError, ConfigResult};

/// Current version of media-core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{CoreError, Result, ErrorCategory, ErrorSeverity, ErrorExt};
    pub use crate::error::{RetryPolicy, RetryBuilder, retry_with_policy};
    pub use crate::auth::BearerDecoder;
    pub use crate::config::AppConfig;
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}

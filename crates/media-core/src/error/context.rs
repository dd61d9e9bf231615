//! # Error Context Utilities
//!
//! This module provides utilities for adding rich context to errors,
//! including correlation IDs, structured metadata, and error chaining.

use super::{CoreError, ErrorCategory, ErrorSeverity, ErrorMetadata};
use std::collections::HashMap;
use serde::Serialize;
use serde_json::{json, Value};

/// Error with additional context
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: CoreError,
    /// Error metadata
    pub metadata: ErrorMetadata,
    /// Error chain (causes)
    pub chain: Vec<String>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(error: CoreError) -> Self {
        let (category, severity, code) = categorize_error(&error);
        Self {
            error,
            metadata: ErrorMetadata::new(category, severity, code),
            chain: Vec::new(),
        }
    }

    /// Add context value
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.metadata.context.insert(key.into(), json_value);
        }
        self
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(id.into());
        self
    }

    /// Add to error chain
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.chain.push(cause.into());
        self
    }

    /// Convert to JSON for logging
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.error.to_string(),
            "category": self.metadata.category,
            "severity": self.metadata.severity,
            "code": self.metadata.error_code,
            "correlation_id": self.metadata.correlation_id,
            "context": self.metadata.context,
            "chain": self.chain,
            "timestamp": self.metadata.timestamp,
            "retry_count": self.metadata.retry_count,
        })
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContextExt: Sized {
    /// Add context to the error
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext;

    /// Add correlation ID
    fn with_correlation_id(self, id: impl Into<String>) -> ErrorContext;

    /// Add multiple context values
    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext;
}

impl ErrorContextExt for CoreError {
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext {
        ErrorContext::new(self).with_context(key, value)
    }

    fn with_correlation_id(self, id: impl Into<String>) -> ErrorContext {
        ErrorContext::new(self).with_correlation_id(id)
    }

    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext {
        let mut error_context = ErrorContext::new(self);
        for (key, value) in contexts {
            error_context.metadata.context.insert(key, value);
        }
        error_context
    }
}

/// Categorize error for proper handling, by effect rather than by variant
/// name (the same classification spec.md's error taxonomy names).
pub fn categorize_error(error: &CoreError) -> (ErrorCategory, ErrorSeverity, String) {
    match error {
        CoreError::Database { .. } => (ErrorCategory::Transient, ErrorSeverity::Error, "DB_001".to_string()),
        CoreError::Collaborator { status_code, .. } => {
            // spec.md section 7: "Permanent step failures (collaborator
            // returns a 4xx other than 409)". 409 is a concurrency
            // conflict, not a permanent rejection, so it stays retryable
            // alongside 408 (timeout) and 429 (rate limit).
            let permanent_client_error = matches!(status_code, Some(code) if (400..500).contains(code) && *code != 408 && *code != 409 && *code != 429);
            if permanent_client_error {
                (ErrorCategory::Permanent, ErrorSeverity::Warning, "COLLAB_4XX".to_string())
            } else {
                (ErrorCategory::Transient, ErrorSeverity::Warning, "COLLAB_001".to_string())
            }
        }
        CoreError::CircuitOpen { .. } => (ErrorCategory::Transient, ErrorSeverity::Warning, "CB_OPEN".to_string()),
        CoreError::VersionConflict { .. } => (ErrorCategory::Business, ErrorSeverity::Info, "VERSION_CONFLICT".to_string()),
        CoreError::InvalidRequest { .. } => (ErrorCategory::User, ErrorSeverity::Warning, "VAL_001".to_string()),
        CoreError::NotFound { .. } => (ErrorCategory::User, ErrorSeverity::Info, "NOT_FOUND".to_string()),
        CoreError::Serialization { .. } => (ErrorCategory::System, ErrorSeverity::Error, "SER_001".to_string()),
        CoreError::Configuration { .. } => (ErrorCategory::Permanent, ErrorSeverity::Critical, "CFG_001".to_string()),
        CoreError::Internal { .. } => (ErrorCategory::System, ErrorSeverity::Error, "UNKNOWN_001".to_string()),
    }
}

/// Error context builder for fluent API
pub struct ErrorContextBuilder {
    error: CoreError,
    context: HashMap<String, Value>,
    correlation_id: Option<String>,
    causes: Vec<String>,
}

impl ErrorContextBuilder {
    /// Create new builder
    pub fn new(error: CoreError) -> Self {
        Self {
            error,
            context: HashMap::new(),
            correlation_id: None,
            causes: Vec::new(),
        }
    }

    /// Add context value
    pub fn context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.context.insert(key.into(), json_value);
        }
        self
    }

    /// Set correlation ID
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add cause
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Build error context
    pub fn build(self) -> ErrorContext {
        let mut error_context = ErrorContext::new(self.error);
        error_context.metadata.context = self.context;
        error_context.metadata.correlation_id = self.correlation_id;
        error_context.chain = self.causes;
        error_context
    }
}

/// Correlation ID generator
pub struct CorrelationIdGenerator;

impl CorrelationIdGenerator {
    /// Generate a new correlation ID
    pub fn generate() -> String {
        use uuid::Uuid;
        format!("req-{}", Uuid::new_v4())
    }

    /// Generate with prefix
    pub fn generate_with_prefix(prefix: &str) -> String {
        use uuid::Uuid;
        format!("{}-{}", prefix, Uuid::new_v4())
    }
}

/// Context provider trait for extracting context from various sources
pub trait ContextProvider {
    /// Extract context into a HashMap
    fn extract_context(&self) -> HashMap<String, Value>;
}

/// Request context for HTTP requests
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub path: String,
    pub method: String,
}

impl ContextProvider for RequestContext {
    fn extract_context(&self) -> HashMap<String, Value> {
        let mut context = HashMap::new();
        context.insert("request_id".to_string(), json!(self.request_id));
        context.insert("path".to_string(), json!(self.path));
        context.insert("method".to_string(), json!(self.method));

        if let Some(ref user_id) = self.user_id {
            context.insert("user_id".to_string(), json!(user_id));
        }
        if let Some(ref session_id) = self.session_id {
            context.insert("session_id".to_string(), json!(session_id));
        }
        if let Some(ref ip) = self.ip_address {
            context.insert("ip_address".to_string(), json!(ip));
        }
        if let Some(ref ua) = self.user_agent {
            context.insert("user_agent".to_string(), json!(ua));
        }

        context
    }
}

/// Macro for adding context to errors easily
#[macro_export]
macro_rules! error_context {
    ($error:expr, $($key:expr => $value:expr),* $(,)?) => {{
        use $crate::error::ErrorContextExt;
        let mut ctx = $crate::error::ErrorContext::new($error);
        $(
            ctx = ctx.with_context($key, $value);
        )*
        ctx
    }};
}

/// Macro for creating errors with context
#[macro_export]
macro_rules! core_error {
    ($variant:ident { $($field:ident: $value:expr),* $(,)? }) => {
        $crate::error::CoreError::$variant {
            $($field: $value),*
        }
    };

    ($variant:ident { $($field:ident: $value:expr),* $(,)? }, context: { $($key:expr => $ctx_value:expr),* $(,)? }) => {{
        use $crate::error::ErrorContextExt;
        let error = $crate::error::CoreError::$variant {
            $($field: $value),*
        };
        let mut ctx = $crate::error::ErrorContext::new(error);
        $(
            ctx = ctx.with_context($key, $ctx_value);
        )*
        ctx
    }};
}

//! Forward/compensating actions invoked by saga steps. Each action is an
//! RPC to one of the three external collaborators spec.md section 1
//! treats as idempotent remote operations: the media-command process
//! endpoint, the album service, and the notification service.

use async_trait::async_trait;
use media_core::error::{CircuitBreaker, CircuitBreakerConfig};
use media_core::{CoreError, Result};
use serde_json::Value;
use std::time::Duration;

/// A single saga step's side effect: invoked for the forward action and,
/// separately, for the compensating action.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// `payload` is the saga's accumulated context; the returned value is
    /// merged back into it under the step's name.
    async fn invoke(&self, payload: &Value) -> Result<Value>;
}

/// Posts JSON to a collaborator endpoint. Non-2xx responses become
/// [`CoreError::Collaborator`] carrying the status code; `media-core`'s
/// error categorization (not this type) decides whether that status is
/// retryable.
///
/// Each instance owns its own [`CircuitBreaker`]: a collaborator that is
/// down should stop receiving dispatch attempts during a saga step's
/// retry loop rather than being hammered for the full `maxRetries`
/// budget on every saga that touches it.
pub struct HttpAction {
    client: reqwest::Client,
    url: String,
    circuit_breaker: CircuitBreaker,
}

impl HttpAction {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self { client, url: url.into(), circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()) }
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CoreError::Collaborator {
                service: self.url.clone(),
                message: e.to_string(),
                status_code: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if status.is_success() {
            response.json::<Value>().await.or(Ok(Value::Null))
        } else if status.as_u16() == 409 {
            Err(CoreError::Collaborator {
                service: self.url.clone(),
                message: "collaborator reported a conflict".to_string(),
                status_code: Some(409),
            })
        } else if status.is_server_error() {
            Err(CoreError::Collaborator {
                service: self.url.clone(),
                message: format!("collaborator returned {status}"),
                status_code: Some(status.as_u16()),
            })
        } else {
            // Permanent 4xx other than 409: not retried (spec.md section 7).
            Err(CoreError::Collaborator {
                service: self.url.clone(),
                message: format!("collaborator rejected request with {status}"),
                status_code: Some(status.as_u16()),
            })
        }
    }
}

#[async_trait]
impl StepAction for HttpAction {
    async fn invoke(&self, payload: &Value) -> Result<Value> {
        self.circuit_breaker.call(|| self.post(payload)).await.map_err(|e| match e {
            CoreError::CircuitOpen { .. } => CoreError::CircuitOpen { service: self.url.clone() },
            other => other,
        })
    }
}

/// A no-op action, used for steps whose compensation is intentionally
/// absent (`send_notification`'s terminal non-reversible compensation)
/// and in registry unit tests.
pub struct NoopAction;

#[async_trait]
impl StepAction for NoopAction {
    async fn invoke(&self, _payload: &Value) -> Result<Value> {
        Ok(Value::Null)
    }
}

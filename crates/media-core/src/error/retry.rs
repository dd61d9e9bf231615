//! Exponential backoff retry, shared by saga step dispatch and outbound
//! collaborator calls.
//!
//! The saga engine's retry schedule is `2^(attempt-1)` seconds (attempt 1
//! sleeps 1s, attempt 2 sleeps 2s, attempt 3 sleeps 4s) up to
//! `max_attempts`. This mirrors the `RetryPolicy` shape carried in the
//! saga store, just promoted to a shared, independently testable unit.

use super::{CoreError, ErrorCategory, ErrorExt};
use rand::Rng;
use std::time::Duration;

/// Configures how many times and how long an operation is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for attempt 1.
    pub base_delay: Duration,
    /// Upper bound on any single delay, regardless of attempt number.
    pub max_delay: Duration,
    /// Whether delay doubles per attempt (`true`) or stays at `base_delay`.
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before the given attempt (1-indexed), with a small
    /// jitter so that concurrently retrying callers don't thunder in
    /// lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_millis = if self.exponential_backoff {
            let exponent = attempt.saturating_sub(1).min(20);
            self.base_delay.as_millis() as u64 * (1u64 << exponent)
        } else {
            self.base_delay.as_millis() as u64
        };
        let capped = base_millis.min(self.max_delay.as_millis() as u64);
        let jitter = rand::thread_rng().gen_range(0..50);
        Duration::from_millis(capped + jitter)
    }
}

/// An error that knows whether retrying it is worthwhile.
pub trait RetryableError {
    /// Whether another attempt should be made.
    fn is_retryable(&self) -> bool;
}

impl RetryableError for CoreError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Database { .. } | CoreError::Collaborator { .. } | CoreError::CircuitOpen { .. }
        ) && self.category() == ErrorCategory::Transient
    }
}

/// Run `operation` under `policy`, sleeping between attempts for
/// retryable errors and returning immediately on a non-retryable one.
pub async fn retry_with_policy<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.max_attempts && error.is_retryable() => {
                // delay_for_attempt is keyed on the attempt about to run,
                // not the one that just failed.
                let delay = policy.delay_for_attempt(attempt + 1);
                tracing::warn!(attempt, ?delay, error = %error, "retrying after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Fluent builder for [`RetryPolicy`], mirroring the rest of this crate's
/// builder-style configuration types.
pub struct RetryBuilder {
    policy: RetryPolicy,
}

impl RetryBuilder {
    /// Start from the default policy.
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    /// Override the maximum attempt count.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    /// Override the base delay.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.policy.base_delay = base_delay;
        self
    }

    /// Override the max delay cap.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.policy.max_delay = max_delay;
        self
    }

    /// Build the policy.
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_policy_matches_saga_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        // attempt 1 -> ~1s, attempt 2 -> ~2s, attempt 3 -> ~4s, before jitter/cap.
        assert!(policy.delay_for_attempt(1).as_millis() >= 1000);
        assert!(policy.delay_for_attempt(2).as_millis() >= 2000);
        assert!(policy.delay_for_attempt(3).as_millis() >= 4000);
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let policy = RetryBuilder::new().max_attempts(10).base_delay(Duration::from_secs(1)).max_delay(Duration::from_secs(5)).build();
        let delay = policy.delay_for_attempt(10);
        assert!(delay.as_millis() <= 5050);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryBuilder::new().base_delay(Duration::from_millis(1)).build();
        let result = retry_with_policy(&policy, || {
            let attempts = attempts.clone();
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if count < 2 {
                    Err(CoreError::database_simple("connection reset"))
                } else {
                    Ok(count)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn does_not_retry_invalid_request() {
        let policy = RetryBuilder::new().base_delay(Duration::from_millis(1)).build();
        let attempts = Arc::new(AtomicU32::new(0));
        let result: Result<(), CoreError> = retry_with_policy(&policy, || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::invalid_request("missing field"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

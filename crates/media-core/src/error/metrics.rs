//! Error metrics collection and monitoring integration.
//!
//! Tracks error rates by category/severity/type, retry attempts, and
//! circuit breaker transitions, all exported as Prometheus metrics.

use super::{CoreError, ErrorCategory, ErrorSeverity, ErrorExt};
use prometheus::{Counter, CounterVec, Histogram, Registry};
use lazy_static::lazy_static;

lazy_static! {
    static ref ERROR_METRICS: ErrorMetrics = ErrorMetrics::new();
}

/// Error metrics collector
pub struct ErrorMetrics {
    /// Total error counter by category
    pub errors_by_category: CounterVec,
    /// Total error counter by severity
    pub errors_by_severity: CounterVec,
    /// Error counter by specific error code
    pub errors_by_code: CounterVec,
    /// Retry attempts counter
    pub retry_attempts: Counter,
    /// Successful retries counter
    pub retry_successes: Counter,
    /// Circuit breaker state changes
    pub circuit_breaker_transitions: CounterVec,
    /// Error handling duration
    pub error_handling_duration: Histogram,
}

impl ErrorMetrics {
    fn new() -> Self {
        let errors_by_category = CounterVec::new(
            prometheus::Opts::new("media_errors_by_category_total", "Total number of errors by category"),
            &["category"],
        )
        .expect("failed to create errors_by_category metric");

        let errors_by_severity = CounterVec::new(
            prometheus::Opts::new("media_errors_by_severity_total", "Total number of errors by severity"),
            &["severity"],
        )
        .expect("failed to create errors_by_severity metric");

        let errors_by_code = CounterVec::new(
            prometheus::Opts::new("media_errors_by_code_total", "Total number of errors by error code"),
            &["error_code"],
        )
        .expect("failed to create errors_by_code metric");

        let retry_attempts = Counter::new("media_retry_attempts_total", "Total number of retry attempts")
            .expect("failed to create retry_attempts metric");

        let retry_successes = Counter::new("media_retry_successes_total", "Total number of successful retries")
            .expect("failed to create retry_successes metric");

        let circuit_breaker_transitions = CounterVec::new(
            prometheus::Opts::new("media_circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state", "service"],
        )
        .expect("failed to create circuit_breaker_transitions metric");

        let error_handling_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new("media_error_handling_duration_seconds", "Time spent handling errors")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("failed to create error_handling_duration metric");

        Self {
            errors_by_category,
            errors_by_severity,
            errors_by_code,
            retry_attempts,
            retry_successes,
            circuit_breaker_transitions,
            error_handling_duration,
        }
    }

    /// Register all metrics with a Prometheus registry.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.errors_by_category.clone()))?;
        registry.register(Box::new(self.errors_by_severity.clone()))?;
        registry.register(Box::new(self.errors_by_code.clone()))?;
        registry.register(Box::new(self.retry_attempts.clone()))?;
        registry.register(Box::new(self.retry_successes.clone()))?;
        registry.register(Box::new(self.circuit_breaker_transitions.clone()))?;
        registry.register(Box::new(self.error_handling_duration.clone()))?;
        Ok(())
    }
}

/// Global error metrics
pub fn metrics() -> &'static ErrorMetrics {
    &ERROR_METRICS
}

/// Record an error occurrence.
pub fn record_error(error: &CoreError) {
    let category = error.category();
    let severity = error.severity();

    metrics().errors_by_category.with_label_values(&[&format!("{category:?}")]).inc();
    metrics().errors_by_severity.with_label_values(&[&format!("{severity:?}")]).inc();
    metrics().errors_by_code.with_label_values(&[error.error_code()]).inc();
}

/// Record a retry attempt.
pub fn record_retry_attempt() {
    metrics().retry_attempts.inc();
}

/// Record a retry that eventually succeeded.
pub fn record_retry_success() {
    metrics().retry_successes.inc();
}

/// Record a circuit breaker state transition.
pub fn record_circuit_breaker_transition(from_state: &str, to_state: &str, service: &str) {
    metrics().circuit_breaker_transitions.with_label_values(&[from_state, to_state, service]).inc();
}

/// Record time spent in an error-handling path.
pub fn record_error_handling_duration(duration: std::time::Duration) {
    metrics().error_handling_duration.observe(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_error_by_category_and_code() {
        let metrics = ErrorMetrics::new();
        metrics.errors_by_category.with_label_values(&["Transient"]).inc();
        assert_eq!(metrics.errors_by_category.with_label_values(&["Transient"]).get(), 1.0);
    }

    #[test]
    fn record_error_increments_global_counters() {
        let before = metrics().errors_by_code.with_label_values(&["DB_001"]).get();
        record_error(&CoreError::database_simple("connection reset"));
        let after = metrics().errors_by_code.with_label_values(&["DB_001"]).get();
        assert_eq!(after, before + 1.0);
    }
}

//! Prometheus metrics (SPEC_FULL.md section F): event/projector/saga
//! counters the teacher always carries regardless of spec.md's "real-time
//! push" non-goal — a counter is not a push-delivery mechanism.

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref EVENTS_APPENDED_TOTAL: IntCounter = IntCounter::new(
        "media_events_appended_total",
        "Total events successfully appended to the log"
    )
    .expect("metric description is static and valid");

    pub static ref PROJECTOR_BATCH_APPLIED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("media_projector_batch_applied_total", "Events applied per projector tick"),
        &["projector"]
    )
    .expect("metric description is static and valid");

    pub static ref SAGA_STEPS_STARTED_TOTAL: IntCounter = IntCounter::new(
        "media_saga_steps_started_total",
        "Saga steps that began executing their forward action"
    )
    .expect("metric description is static and valid");

    pub static ref SAGA_STEPS_RETRIED_TOTAL: IntCounter = IntCounter::new(
        "media_saga_steps_retried_total",
        "Saga step attempts that failed and were retried"
    )
    .expect("metric description is static and valid");

    pub static ref SAGA_STEPS_FAILED_TOTAL: IntCounter = IntCounter::new(
        "media_saga_steps_failed_total",
        "Saga steps that exhausted retries without success"
    )
    .expect("metric description is static and valid");

    pub static ref SAGA_STEPS_COMPENSATED_TOTAL: IntCounter = IntCounter::new(
        "media_saga_steps_compensated_total",
        "Saga steps whose compensating action ran to completion"
    )
    .expect("metric description is static and valid");

    pub static ref SAGA_ENGINE_TICK_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("media_saga_engine_tick_seconds", "Saga engine tick wall-clock duration")
    )
    .expect("metric description is static and valid");
}

/// Registers every metric with [`REGISTRY`]. Called once at startup;
/// idempotent registration errors (e.g. in tests that call this twice)
/// are logged, not propagated.
pub fn register_all() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_APPENDED_TOTAL.clone()),
        Box::new(PROJECTOR_BATCH_APPLIED_TOTAL.clone()),
        Box::new(SAGA_STEPS_STARTED_TOTAL.clone()),
        Box::new(SAGA_STEPS_RETRIED_TOTAL.clone()),
        Box::new(SAGA_STEPS_FAILED_TOTAL.clone()),
        Box::new(SAGA_STEPS_COMPENSATED_TOTAL.clone()),
        Box::new(SAGA_ENGINE_TICK_SECONDS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            tracing::debug!(error = %e, "metric already registered");
        }
    }
}

/// Renders the registry in the Prometheus text exposition format.
pub fn render() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

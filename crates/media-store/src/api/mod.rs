//! HTTP surfaces (spec.md section 6): the event log's wire protocol,
//! the saga control surface, and ambient health/metrics endpoints.

pub mod events;
pub mod health;
pub mod metrics;
pub mod sagas;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    events::configure(cfg);
    health::configure(cfg);
    sagas::configure(cfg);
    cfg.service(metrics::metrics);
}

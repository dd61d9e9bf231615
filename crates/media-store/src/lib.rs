//! Event log, CQRS projector, and saga orchestration for a media
//! upload pipeline.
//!
//! Three subsystems, each owning its own tables and polling the log
//! independently:
//!
//! - [`events`]: the append-only event log itself.
//! - [`projector`]: builds read-optimized views by replaying the log.
//! - [`saga`]: drives the `media_upload` workflow's forward/compensating
//!   steps against collaborator services.
//!
//! [`api`] exposes all three over HTTP; [`db`] and [`schema`] are the
//! shared persistence layer; [`offset`] is the watermark bookkeeping
//! both the projector and the saga engine use to track how much of the
//! log they have consumed.

pub mod api;
pub mod db;
pub mod events;
pub mod metrics;
pub mod offset;
pub mod projector;
pub mod saga;
pub mod schema;

pub use events::{Event, EventLog, PgEventLog};
pub use projector::MediaProjector;
pub use saga::{SagaEngine, SagaRegistry, StuckSagaDetector};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::events::{AggregateType, Event, EventLog, EventType, PgEventLog};
    pub use crate::saga::{SagaEngine, SagaRegistry};
    pub use media_core::prelude::*;
}

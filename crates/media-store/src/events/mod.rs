//! The event log: spec.md section 4.1.

pub mod store;
pub mod types;

pub use store::{EventLog, PgEventLog};
pub use types::{
    calculate_checksum, AggregateType, Event, EventType, MediaProcessedPayload,
    MediaProcessingFailedPayload, MediaUploadedPayload,
};

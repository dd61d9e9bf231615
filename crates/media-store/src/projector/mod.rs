//! CQRS read-model projector (spec.md section 4.2).

pub mod media_projector;

pub use media_projector::{MediaProjector, MediaReadModelRow, TickOutcome};

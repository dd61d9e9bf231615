//! Event log domain types: the closed event-type catalog, per-type
//! payload schemas, and the `Event`/`EventRecord` pair (domain type vs.
//! the diesel row it maps to).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use media_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::events;

/// The enumerated aggregate types an event can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    Media,
    Album,
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateType::Media => "media",
            AggregateType::Album => "album",
        };
        f.write_str(s)
    }
}

impl FromStr for AggregateType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" => Ok(AggregateType::Media),
            "album" => Ok(AggregateType::Album),
            other => Err(CoreError::invalid_request(format!("unknown aggregate_type: {other}"))),
        }
    }
}

/// The closed event-type catalog from spec.md section 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MediaUploaded,
    MediaProcessed,
    MediaProcessingFailed,
    MediaDeleted,
    MediaUploadCompensated,
    AlbumCreated,
    AlbumDeleted,
    MediaAddedToAlbum,
    MediaRemovedFromAlbum,
    NotificationSent,
}

impl EventType {
    /// All known event types, used by the saga registry's load-time
    /// validation to check that trigger events are recognized.
    pub const ALL: &'static [EventType] = &[
        EventType::MediaUploaded,
        EventType::MediaProcessed,
        EventType::MediaProcessingFailed,
        EventType::MediaDeleted,
        EventType::MediaUploadCompensated,
        EventType::AlbumCreated,
        EventType::AlbumDeleted,
        EventType::MediaAddedToAlbum,
        EventType::MediaRemovedFromAlbum,
        EventType::NotificationSent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MediaUploaded => "MediaUploaded",
            EventType::MediaProcessed => "MediaProcessed",
            EventType::MediaProcessingFailed => "MediaProcessingFailed",
            EventType::MediaDeleted => "MediaDeleted",
            EventType::MediaUploadCompensated => "MediaUploadCompensated",
            EventType::AlbumCreated => "AlbumCreated",
            EventType::AlbumDeleted => "AlbumDeleted",
            EventType::MediaAddedToAlbum => "MediaAddedToAlbum",
            EventType::MediaRemovedFromAlbum => "MediaRemovedFromAlbum",
            EventType::NotificationSent => "NotificationSent",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::invalid_request(format!("unknown event_type: {s}")))
    }
}

/// An immutable record in the event log (spec.md section 3's `Event`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: AggregateType,
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub version: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// The diesel-mapped row. Kept separate from [`Event`] because the
/// stored `aggregate_type`/`event_type` are plain strings; conversion
/// validates them back into the closed enums on read.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
pub struct EventRow {
    pub id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub version: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEventRow {
    pub id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub version: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = CoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type.parse()?,
            event_type: row.event_type.parse()?,
            data: row.data,
            version: row.version,
            checksum: row.checksum,
            created_at: row.created_at,
        })
    }
}

/// `MediaUploaded` payload (spec.md section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUploadedPayload {
    pub user_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub storage_path: String,
}

/// `MediaProcessed` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProcessedPayload {
    pub thumbnail_path: String,
    pub width: i32,
    pub height: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// `MediaProcessingFailed` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProcessingFailedPayload {
    pub reason: String,
}

/// Checksum over `data` for tamper-evidence on read (SPEC_FULL.md F).
/// Not load-bearing for any invariant; carried forward from the teacher's
/// `calculate_checksum`.
pub fn calculate_checksum(data: &serde_json::Value) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn event_type_display_from_str_roundtrip() {
        for event_type in EventType::ALL {
            let parsed: EventType = event_type.to_string().parse().unwrap();
            assert_eq!(parsed, *event_type);
        }
    }

    #[test]
    fn aggregate_type_display_from_str_roundtrip() {
        for aggregate_type in [AggregateType::Media, AggregateType::Album] {
            let parsed: AggregateType = aggregate_type.to_string().parse().unwrap();
            assert_eq!(parsed, aggregate_type);
        }
    }

    proptest! {
        /// Invariant: the checksum is a pure function of the payload — same
        /// input always yields the same digest (spec.md section 8 relies on
        /// this for tamper-evidence to be meaningful at all).
        #[test]
        fn checksum_is_deterministic(s in ".{0,64}", n in any::<i64>()) {
            let value = serde_json::json!({"s": s, "n": n});
            prop_assert_eq!(calculate_checksum(&value), calculate_checksum(&value));
        }

        /// Changing the payload changes the checksum (no collisions across
        /// the small perturbation space a proptest run explores).
        #[test]
        fn checksum_changes_with_payload(s in ".{1,64}") {
            let original = serde_json::json!({"s": s.clone()});
            let mutated = serde_json::json!({"s": format!("{s}x")});
            prop_assert_ne!(calculate_checksum(&original), calculate_checksum(&mutated));
        }
    }
}

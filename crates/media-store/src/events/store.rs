//! The append-only event log (spec.md section 4.1).
//!
//! `(aggregate_id, version)` uniqueness is enforced by a database
//! constraint (`events_aggregate_id_version_key` in the migration); a
//! unique-violation on insert is what turns a racing concurrent append
//! into [`CoreError::VersionConflict`] rather than a generic database
//! error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use media_core::{CoreError, Result};
use uuid::Uuid;

use crate::db::session::DbPool;
use crate::schema::events;

use super::types::{calculate_checksum, AggregateType, Event, EventRow, EventType, NewEventRow};

/// The five read operations plus `Append`, as named in spec.md section 4.1.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(
        &self,
        aggregate_id: &str,
        aggregate_type: AggregateType,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<Event>;

    async fn get_by_aggregate(&self, aggregate_id: &str) -> Result<Vec<Event>>;
    async fn get_by_type(&self, event_type: EventType) -> Result<Vec<Event>>;
    async fn get_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>>;
    async fn get_latest_version(&self, aggregate_id: &str) -> Result<i64>;
    async fn get_all(&self) -> Result<Vec<Event>>;
}

/// PostgreSQL-backed implementation.
pub struct PgEventLog {
    pool: DbPool,
}

impl PgEventLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(CoreError::from)
    }

    fn rows_to_events(rows: Vec<EventRow>) -> Result<Vec<Event>> {
        rows.into_iter().map(Event::try_from).collect()
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(
        &self,
        aggregate_id: &str,
        aggregate_type: AggregateType,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<Event> {
        if aggregate_id.trim().is_empty() {
            return Err(CoreError::invalid_request("aggregate_id must not be empty"));
        }

        let mut conn = self.conn()?;

        // Reading the max version and inserting the next one is not
        // itself atomic; the database's uniqueness constraint on
        // (aggregate_id, version) is the actual serialization point, so a
        // losing concurrent writer surfaces as a constraint violation
        // below rather than a silently-wrong version.
        let next_version: i64 = events::table
            .filter(events::aggregate_id.eq(aggregate_id))
            .select(diesel::dsl::max(events::version))
            .first::<Option<i64>>(&mut conn)
            .map_err(CoreError::from)?
            .unwrap_or(0)
            + 1;

        let new_row = NewEventRow {
            id: Uuid::new_v4(),
            aggregate_id: aggregate_id.to_string(),
            aggregate_type: aggregate_type.to_string(),
            event_type: event_type.to_string(),
            checksum: calculate_checksum(&data),
            data,
            version: next_version,
            created_at: Utc::now(),
        };

        let inserted = diesel::insert_into(events::table)
            .values(&new_row)
            .get_result::<EventRow>(&mut conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _) => {
                    CoreError::VersionConflict {
                        aggregate_id: aggregate_id.to_string(),
                        expected: next_version,
                        actual: next_version,
                    }
                }
                other => CoreError::from(other),
            })?;

        Event::try_from(inserted)
    }

    async fn get_by_aggregate(&self, aggregate_id: &str) -> Result<Vec<Event>> {
        let mut conn = self.conn()?;
        let rows = events::table
            .filter(events::aggregate_id.eq(aggregate_id))
            .order_by(events::version.asc())
            .load::<EventRow>(&mut conn)
            .map_err(CoreError::from)?;
        Self::rows_to_events(rows)
    }

    async fn get_by_type(&self, event_type: EventType) -> Result<Vec<Event>> {
        let mut conn = self.conn()?;
        let rows = events::table
            .filter(events::event_type.eq(event_type.to_string()))
            .order_by((events::created_at.asc(), events::id.asc()))
            .load::<EventRow>(&mut conn)
            .map_err(CoreError::from)?;
        Self::rows_to_events(rows)
    }

    async fn get_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut conn = self.conn()?;
        let rows = events::table
            .filter(events::created_at.gt(since))
            .order_by((events::created_at.asc(), events::id.asc()))
            .load::<EventRow>(&mut conn)
            .map_err(CoreError::from)?;
        Self::rows_to_events(rows)
    }

    async fn get_latest_version(&self, aggregate_id: &str) -> Result<i64> {
        let mut conn = self.conn()?;
        let version = events::table
            .filter(events::aggregate_id.eq(aggregate_id))
            .select(diesel::dsl::max(events::version))
            .first::<Option<i64>>(&mut conn)
            .map_err(CoreError::from)?;
        Ok(version.unwrap_or(0))
    }

    async fn get_all(&self) -> Result<Vec<Event>> {
        let mut conn = self.conn()?;
        let rows = events::table
            .order_by((events::created_at.asc(), events::id.asc()))
            .load::<EventRow>(&mut conn)
            .map_err(CoreError::from)?;
        Self::rows_to_events(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_rejects_blank_aggregate_id() {
        // Validation happens before any connection is touched, so this
        // is exercisable without a database.
        let pool = crate::db::session::unconnected_pool_for_tests();
        let log = PgEventLog::new(pool);
        let result = log
            .append("  ", AggregateType::Media, EventType::MediaUploaded, serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(CoreError::InvalidRequest { .. })));
    }
}

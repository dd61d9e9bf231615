//! The media projector: spec.md section 4.2, instantiated for the
//! illustrative media read model of section 4.2's dispatch table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use media_core::{CoreError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::db::session::DbPool;
use crate::events::{AggregateType, Event, EventLog, EventType};
use crate::offset;
use crate::schema::media_read_model;

const OFFSET_NAME: &str = "media_projector";

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = media_read_model)]
pub struct MediaReadModelRow {
    pub aggregate_id: String,
    pub status: String,
    pub user_id: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    pub storage_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<f64>,
    pub last_event_version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Background loop that keeps [`MediaReadModelRow`] consistent with the
/// event log (spec.md section 4.2's "Protocol").
pub struct MediaProjector {
    pool: DbPool,
    event_log: Arc<dyn EventLog>,
    poll_interval: Duration,
}

/// Outcome of one tick, surfaced mainly for tests and metrics.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub applied: usize,
    pub skipped_poison: bool,
    pub watermark_advanced: bool,
}

impl MediaProjector {
    pub fn new(pool: DbPool, event_log: Arc<dyn EventLog>, poll_interval: Duration) -> Self {
        Self { pool, event_log, poll_interval }
    }

    /// Runs forever, ticking on `poll_interval`. Intended to be spawned
    /// as an independent Tokio task.
    pub async fn run(self) {
        loop {
            match self.tick().await {
                Ok(outcome) if outcome.applied > 0 => {
                    tracing::info!(applied = outcome.applied, "media projector applied batch")
                }
                Ok(_) => tracing::debug!("media projector tick: no-op"),
                Err(e) => tracing::warn!(error = %e, "media projector tick failed, retrying next interval"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One tick: read the watermark, fetch the batch, apply it in
    /// contiguous-prefix order, and durably advance the watermark only
    /// past what was applied without error.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let mut conn = self.pool.get().map_err(CoreError::from)?;
        let watermark = offset::read_watermark(&mut conn, OFFSET_NAME)?;
        drop(conn);

        let batch = self.event_log.get_since(watermark).await?;
        if batch.is_empty() {
            return Ok(TickOutcome::default());
        }

        let mut applied = 0usize;
        let mut last_applied_created_at: Option<DateTime<Utc>> = None;
        let mut skipped_poison = false;

        for event in &batch {
            match self.apply(event) {
                Ok(()) => {
                    applied += 1;
                    last_applied_created_at = Some(event.created_at);
                }
                Err(e) => {
                    // Halt discipline (SPEC_FULL.md G / spec.md section 9's
                    // open question): stop at the failing event so it is
                    // retried next tick instead of leaving a gap.
                    tracing::error!(event_id = %event.id, error = %e, "media projector handler failed, halting batch");
                    skipped_poison = true;
                    break;
                }
            }
        }

        let watermark_advanced = if let Some(created_at) = last_applied_created_at {
            let mut conn = self.pool.get().map_err(CoreError::from)?;
            offset::write_watermark(&mut conn, OFFSET_NAME, offset::advance_past(created_at))?;
            true
        } else {
            false
        };

        if applied > 0 {
            crate::metrics::PROJECTOR_BATCH_APPLIED_TOTAL
                .with_label_values(&["media_projector"])
                .inc_by(applied as u64);
        }

        Ok(TickOutcome { applied, skipped_poison, watermark_advanced })
    }

    /// Rebuild the read model from scratch (spec.md section 4.2,
    /// "Rebuild"). Safe under concurrent appends: the `last_event_version`
    /// guard on every upsert means replaying an event already applied by
    /// a subsequent normal poll is a no-op.
    pub async fn rebuild_from_log(&self) -> Result<()> {
        {
            let mut conn = self.pool.get().map_err(CoreError::from)?;
            diesel::delete(media_read_model::table).execute(&mut conn).map_err(CoreError::from)?;
        }

        let all = self.event_log.get_all().await?;
        let mut last_created_at = None;
        for event in &all {
            // A single poison event during rebuild is logged and skipped
            // rather than aborting the whole rebuild; it will also be
            // surfaced by normal ticks afterward.
            if let Err(e) = self.apply(event) {
                tracing::error!(event_id = %event.id, error = %e, "rebuild: skipping event that failed to apply");
                continue;
            }
            last_created_at = Some(event.created_at);
        }

        let mut conn = self.pool.get().map_err(CoreError::from)?;
        let watermark = last_created_at.map(offset::advance_past).unwrap_or_else(offset::epoch);
        offset::write_watermark(&mut conn, OFFSET_NAME, watermark)?;
        Ok(())
    }

    /// Dispatch on `(aggregate_type, event_type)`, per spec.md section
    /// 4.2's table. Non-media events and unrecognized event types are
    /// ignored, not errors.
    fn apply(&self, event: &Event) -> Result<()> {
        if event.aggregate_type != AggregateType::Media {
            return Ok(());
        }

        let mut conn = self.pool.get().map_err(CoreError::from)?;

        match event.event_type {
            EventType::MediaUploaded => self.apply_uploaded(&mut conn, event),
            EventType::MediaProcessed => self.apply_processed(&mut conn, event),
            EventType::MediaProcessingFailed => self.set_status(&mut conn, event, "failed"),
            EventType::MediaDeleted => self.set_status(&mut conn, event, "deleted"),
            EventType::MediaUploadCompensated => self.set_status(&mut conn, event, "deleted"),
            _ => Ok(()),
        }
    }

    fn apply_uploaded(&self, conn: &mut PgConnection, event: &Event) -> Result<()> {
        if !self.should_apply(conn, &event.aggregate_id, event.version)? {
            return Ok(());
        }
        let data = &event.data;
        diesel::insert_into(media_read_model::table)
            .values((
                media_read_model::aggregate_id.eq(&event.aggregate_id),
                media_read_model::status.eq("uploaded"),
                media_read_model::user_id.eq(data.get("user_id").and_then(|v| v.as_str())),
                media_read_model::filename.eq(data.get("filename").and_then(|v| v.as_str())),
                media_read_model::content_type.eq(data.get("content_type").and_then(|v| v.as_str())),
                media_read_model::size.eq(data.get("size").and_then(|v| v.as_i64())),
                media_read_model::storage_path.eq(data.get("storage_path").and_then(|v| v.as_str())),
                media_read_model::last_event_version.eq(event.version),
                media_read_model::updated_at.eq(Utc::now()),
            ))
            .on_conflict(media_read_model::aggregate_id)
            .do_update()
            .set((
                media_read_model::status.eq("uploaded"),
                media_read_model::user_id.eq(data.get("user_id").and_then(|v| v.as_str())),
                media_read_model::filename.eq(data.get("filename").and_then(|v| v.as_str())),
                media_read_model::content_type.eq(data.get("content_type").and_then(|v| v.as_str())),
                media_read_model::size.eq(data.get("size").and_then(|v| v.as_i64())),
                media_read_model::storage_path.eq(data.get("storage_path").and_then(|v| v.as_str())),
                media_read_model::last_event_version.eq(event.version),
                media_read_model::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn apply_processed(&self, conn: &mut PgConnection, event: &Event) -> Result<()> {
        if !self.should_apply(conn, &event.aggregate_id, event.version)? {
            return Ok(());
        }
        let data = &event.data;
        diesel::update(media_read_model::table.filter(media_read_model::aggregate_id.eq(&event.aggregate_id)))
            .set((
                media_read_model::status.eq("processed"),
                media_read_model::thumbnail_path.eq(data.get("thumbnail_path").and_then(|v| v.as_str())),
                media_read_model::width.eq(data.get("width").and_then(|v| v.as_i64()).map(|v| v as i32)),
                media_read_model::height.eq(data.get("height").and_then(|v| v.as_i64()).map(|v| v as i32)),
                media_read_model::duration.eq(data.get("duration").and_then(|v| v.as_f64())),
                media_read_model::last_event_version.eq(event.version),
                media_read_model::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn set_status(&self, conn: &mut PgConnection, event: &Event, status: &str) -> Result<()> {
        if !self.should_apply(conn, &event.aggregate_id, event.version)? {
            return Ok(());
        }
        diesel::update(media_read_model::table.filter(media_read_model::aggregate_id.eq(&event.aggregate_id)))
            .set((
                media_read_model::status.eq(status),
                media_read_model::last_event_version.eq(event.version),
                media_read_model::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// The idempotence guard (spec.md section 4.2): a no-op if the
    /// incoming version is not newer than what's already applied.
    fn should_apply(&self, conn: &mut PgConnection, aggregate_id: &str, incoming_version: i64) -> Result<bool> {
        let current = media_read_model::table
            .filter(media_read_model::aggregate_id.eq(aggregate_id))
            .select(media_read_model::last_event_version)
            .first::<i64>(conn)
            .optional()
            .map_err(CoreError::from)?;
        Ok(match current {
            Some(applied) => incoming_version > applied,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_past_adds_one_nanosecond() {
        let t = Utc::now();
        assert_eq!(offset::advance_past(t), t + chrono::Duration::nanoseconds(1));
    }
}

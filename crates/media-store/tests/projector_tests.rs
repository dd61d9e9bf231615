//! Integration tests for the media projector (spec.md section 8:
//! invariant 3/4 and seed scenario S4's idempotence check).

use std::env;
use std::sync::Arc;
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use media_store::events::{AggregateType, EventLog, EventType, PgEventLog};
use media_store::projector::MediaProjector;
use serial_test::serial;

fn test_pool() -> Option<Pool<ConnectionManager<PgConnection>>> {
    let database_url = env::var("TEST_DATABASE_URL").or_else(|_| env::var("DATABASE_URL")).ok()?;
    let manager = ConnectionManager::<PgConnection>::new(&database_url);
    Pool::builder().max_size(5).build(manager).ok()
}

fn unique_aggregate_id() -> String {
    format!("media-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[serial]
async fn projector_applies_uploaded_then_processed_idempotently() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let event_log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    let aggregate_id = unique_aggregate_id();

    event_log
        .append(
            &aggregate_id,
            AggregateType::Media,
            EventType::MediaUploaded,
            serde_json::json!({"user_id": "u1", "filename": "p.jpg", "content_type": "image/jpeg", "size": 100, "storage_path": "/tmp/p.jpg"}),
        )
        .await
        .unwrap();
    event_log
        .append(
            &aggregate_id,
            AggregateType::Media,
            EventType::MediaProcessed,
            serde_json::json!({"thumbnail_path": "/tmp/thumb.jpg", "width": 10, "height": 10}),
        )
        .await
        .unwrap();

    let projector = MediaProjector::new(pool.clone(), event_log.clone(), Duration::from_secs(2));
    projector.tick().await.unwrap();

    let row = fetch_row(&pool, &aggregate_id);
    assert_eq!(row.status, "processed");
    assert_eq!(row.last_event_version, 2);

    // S4: re-applying the same batch (simulated at-least-once delivery)
    // must not change the read model.
    let before = row;
    projector.tick().await.unwrap(); // no-op, watermark already past both events
    let again = fetch_row(&pool, &aggregate_id);
    assert_eq!(again.status, before.status);
    assert_eq!(again.last_event_version, before.last_event_version);
}

#[tokio::test]
#[serial]
async fn rebuild_from_log_matches_incremental_application() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let event_log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    let aggregate_id = unique_aggregate_id();

    event_log
        .append(
            &aggregate_id,
            AggregateType::Media,
            EventType::MediaUploaded,
            serde_json::json!({"user_id": "u1", "filename": "p.jpg", "content_type": "image/jpeg", "size": 100, "storage_path": "/tmp/p.jpg"}),
        )
        .await
        .unwrap();

    let projector = MediaProjector::new(pool.clone(), event_log.clone(), Duration::from_secs(2));
    projector.tick().await.unwrap();
    let incremental = fetch_row(&pool, &aggregate_id);

    projector.rebuild_from_log().await.unwrap();
    let rebuilt = fetch_row(&pool, &aggregate_id);

    assert_eq!(incremental.status, rebuilt.status);
    assert_eq!(incremental.last_event_version, rebuilt.last_event_version);
}

struct RowSnapshot {
    status: String,
    last_event_version: i64,
}

fn fetch_row(pool: &Pool<ConnectionManager<PgConnection>>, aggregate_id: &str) -> RowSnapshot {
    use media_store::schema::media_read_model;
    let mut conn = pool.get().unwrap();
    let (status, last_event_version) = media_read_model::table
        .filter(media_read_model::aggregate_id.eq(aggregate_id))
        .select((media_read_model::status, media_read_model::last_event_version))
        .first::<(String, i64)>(&mut conn)
        .unwrap();
    RowSnapshot { status, last_event_version }
}

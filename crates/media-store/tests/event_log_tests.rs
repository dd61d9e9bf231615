//! Integration tests for the event log against a real PostgreSQL
//! database (spec.md section 8's invariants 1, 2 and seed scenario S5).
//!
//! These require a reachable database; skip (rather than fail) when one
//! isn't configured, matching the style of the teacher's own
//! `postgresql_event_store_tests.rs`.

use std::env;
use std::sync::Arc;

use chrono::Utc;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use media_store::events::{AggregateType, EventLog, EventType, PgEventLog};

fn test_pool() -> Option<Pool<ConnectionManager<PgConnection>>> {
    let database_url = env::var("TEST_DATABASE_URL").or_else(|_| env::var("DATABASE_URL")).ok()?;
    let manager = ConnectionManager::<PgConnection>::new(&database_url);
    Pool::builder().max_size(5).build(manager).ok()
}

fn unique_aggregate_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
async fn append_assigns_sequential_versions_per_aggregate() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let log = PgEventLog::new(pool);
    let aggregate_id = unique_aggregate_id("media");

    let first = log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"filename": "a.jpg"}))
        .await
        .unwrap();
    let second = log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaProcessed, serde_json::json!({"thumbnail_path": "t.jpg", "width": 1, "height": 1}))
        .await
        .unwrap();

    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert_eq!(log.get_latest_version(&aggregate_id).await.unwrap(), 2);

    // Invariant 2: created_at is monotonically non-decreasing with version.
    let all = log.get_by_aggregate(&aggregate_id).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].created_at <= all[1].created_at);
    assert_eq!(all[0].version, 1);
    assert_eq!(all[1].version, 2);
}

#[tokio::test]
async fn unknown_aggregate_returns_empty_not_error() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let log = PgEventLog::new(pool);
    let events = log.get_by_aggregate(&unique_aggregate_id("media-nonexistent")).await.unwrap();
    assert!(events.is_empty());
    assert_eq!(log.get_latest_version(&unique_aggregate_id("media-nonexistent")).await.unwrap(), 0);
}

/// Seed scenario S5: two concurrent appends to the same aggregate both
/// compute version=1 before either writes; exactly one must win.
#[tokio::test]
async fn concurrent_appends_to_same_aggregate_conflict() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool));
    let aggregate_id = unique_aggregate_id("media-b");

    let log_a = log.clone();
    let log_b = log.clone();
    let agg_a = aggregate_id.clone();
    let agg_b = aggregate_id.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move {
            log_a.append(&agg_a, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"filename": "a.jpg"})).await
        }),
        tokio::spawn(async move {
            log_b.append(&agg_b, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"filename": "b.jpg"})).await
        }),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent append to a fresh aggregate should succeed");

    // The loser can retry at version 2 and succeed.
    let next_version = log.get_latest_version(&aggregate_id).await.unwrap();
    assert_eq!(next_version, 1);
    let retried = log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"filename": "retry.jpg"}))
        .await
        .unwrap();
    assert_eq!(retried.version, 2);
}

#[tokio::test]
async fn get_since_orders_by_created_at_then_insertion() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let log = PgEventLog::new(pool);
    let watermark = Utc::now() - chrono::Duration::seconds(1);
    let aggregate_id = unique_aggregate_id("media-since");

    for i in 0..3 {
        log.append(
            &aggregate_id,
            AggregateType::Media,
            EventType::MediaUploaded,
            serde_json::json!({"filename": format!("f{i}.jpg")}),
        )
        .await
        .unwrap();
    }

    let first_call = log.get_since(watermark).await.unwrap();
    let second_call = log.get_since(watermark).await.unwrap();
    let first_ids: Vec<_> = first_call.iter().map(|e| e.id).collect();
    let second_ids: Vec<_> = second_call.iter().map(|e| e.id).collect();
    assert_eq!(first_ids, second_ids, "repeated GetSince calls must return a stable order");
}

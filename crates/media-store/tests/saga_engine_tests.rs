//! End-to-end tests for the saga engine driving the `media_upload`
//! workflow against mocked collaborators (spec.md section 8, seed
//! scenarios S1-S3 and S6).
//!
//! Requires a reachable database (`TEST_DATABASE_URL`/`DATABASE_URL`);
//! skips rather than fails when one isn't configured.

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use media_core::config::CollaboratorConfig;
use media_core::error::RetryPolicy;
use media_store::events::{AggregateType, EventLog, EventType, PgEventLog};
use media_store::saga::{workflows::media_upload_workflow, SagaEngine, SagaRegistry, SagaStatus, StepStatus, StuckSagaDetector};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn test_pool() -> Option<Pool<ConnectionManager<PgConnection>>> {
    let database_url = env::var("TEST_DATABASE_URL").or_else(|_| env::var("DATABASE_URL")).ok()?;
    let manager = ConnectionManager::<PgConnection>::new(&database_url);
    Pool::builder().max_size(5).build(manager).ok()
}

fn unique_aggregate_id() -> String {
    format!("media-{}", uuid::Uuid::new_v4())
}

async fn always_ok_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({}))).mount(&server).await;
    server
}

fn collaborators(process: &MockServer, album: &MockServer, notify: &MockServer) -> CollaboratorConfig {
    CollaboratorConfig {
        media_command_url: process.uri(),
        album_service_url: album.uri(),
        notification_service_url: notify.uri(),
    }
}

fn saga_row(pool: &Pool<ConnectionManager<PgConnection>>, saga_id: uuid::Uuid) -> media_store::saga::SagaRow {
    use media_store::schema::sagas;
    let mut conn = pool.get().unwrap();
    sagas::table.filter(sagas::id.eq(saga_id)).select(media_store::saga::SagaRow::as_select()).first(&mut conn).unwrap()
}

fn find_saga_for_aggregate(pool: &Pool<ConnectionManager<PgConnection>>, aggregate_id: &str) -> Option<media_store::saga::SagaRow> {
    use media_store::schema::sagas;
    let mut conn = pool.get().unwrap();
    let all: Vec<media_store::saga::SagaRow> = sagas::table.select(media_store::saga::SagaRow::as_select()).load(&mut conn).unwrap();
    all.into_iter().find(|s| s.payload.get("aggregate_id").and_then(|v| v.as_str()) == Some(aggregate_id))
}

fn step_rows(pool: &Pool<ConnectionManager<PgConnection>>, saga_id: uuid::Uuid) -> Vec<media_store::saga::SagaStepRow> {
    use media_store::schema::saga_steps;
    let mut conn = pool.get().unwrap();
    saga_steps::table
        .filter(saga_steps::saga_id.eq(saga_id))
        .order_by(saga_steps::started_at.asc())
        .select(media_store::saga::SagaStepRow::as_select())
        .load(&mut conn)
        .unwrap()
}

/// Seed scenario S1: a `MediaUploaded` event drives the saga through all
/// three steps to `completed` as each success trigger is observed.
#[tokio::test]
async fn happy_path_upload_completes_all_steps() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let event_log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    let process = always_ok_server().await;
    let album = always_ok_server().await;
    let notify = always_ok_server().await;
    let registry = Arc::new(
        SagaRegistry::new(vec![media_upload_workflow(&collaborators(&process, &album, &notify), Duration::from_secs(5))]).unwrap(),
    );
    let engine = SagaEngine::new(pool.clone(), event_log.clone(), registry, RetryPolicy::default(), Duration::from_secs(3));

    let aggregate_id = unique_aggregate_id();
    event_log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"user_id": "u1", "filename": "p.jpg"}))
        .await
        .unwrap();
    engine.tick().await.unwrap();

    let saga = find_saga_for_aggregate(&pool, &aggregate_id).expect("saga should have been created");
    assert_eq!(saga.current_step, "process_media");

    event_log.append(&aggregate_id, AggregateType::Media, EventType::MediaProcessed, serde_json::json!({"thumbnail_path": "t.jpg", "width": 1, "height": 1})).await.unwrap();
    engine.tick().await.unwrap();
    let saga = saga_row(&pool, saga.id);
    assert_eq!(saga.current_step, "add_to_album");

    event_log.append(&aggregate_id, AggregateType::Album, EventType::MediaAddedToAlbum, serde_json::json!({})).await.unwrap();
    engine.tick().await.unwrap();
    let saga = saga_row(&pool, saga.id);
    assert_eq!(saga.current_step, "send_notification");

    event_log.append(&aggregate_id, AggregateType::Media, EventType::NotificationSent, serde_json::json!({})).await.unwrap();
    engine.tick().await.unwrap();
    let saga = saga_row(&pool, saga.id);
    assert_eq!(saga.status, SagaStatus::Completed.to_string());

    let steps = step_rows(&pool, saga.id);
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed.to_string()));
}

/// Seed scenario S2: a processing failure drives compensation and a
/// terminal `failed` status.
#[tokio::test]
async fn processing_failure_triggers_compensation() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let event_log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    let process = always_ok_server().await;
    let album = always_ok_server().await;
    let notify = always_ok_server().await;
    let registry = Arc::new(
        SagaRegistry::new(vec![media_upload_workflow(&collaborators(&process, &album, &notify), Duration::from_secs(5))]).unwrap(),
    );
    let engine = SagaEngine::new(pool.clone(), event_log.clone(), registry, RetryPolicy::default(), Duration::from_secs(3));

    let aggregate_id = unique_aggregate_id();
    event_log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"user_id": "u1", "filename": "p.jpg"}))
        .await
        .unwrap();
    engine.tick().await.unwrap();
    let saga = find_saga_for_aggregate(&pool, &aggregate_id).unwrap();

    event_log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaProcessingFailed, serde_json::json!({"reason": "decode"}))
        .await
        .unwrap();
    engine.tick().await.unwrap();

    let saga = saga_row(&pool, saga.id);
    assert_eq!(saga.status, SagaStatus::Failed.to_string());

    let steps = step_rows(&pool, saga.id);
    let process_step = steps.iter().find(|s| s.step_name == "process_media").unwrap();
    assert_eq!(process_step.status, StepStatus::Failed.to_string());
}

/// Responder that fails with 503 for its first `fail_count` invocations,
/// then returns 200 — drives seed scenario S3's retry-then-succeed path.
struct FlakyResponder {
    remaining_failures: AtomicUsize,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { None }).is_ok() {
            ResponseTemplate::new(503)
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({}))
        }
    }
}

/// Seed scenario S3: the process endpoint fails twice (503) then
/// succeeds; the step completes with `retry_count = 2`.
#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let event_log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    let process = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .respond_with(FlakyResponder { remaining_failures: AtomicUsize::new(2) })
        .mount(&process)
        .await;
    let album = always_ok_server().await;
    let notify = always_ok_server().await;

    let registry = Arc::new(
        SagaRegistry::new(vec![media_upload_workflow(&collaborators(&process, &album, &notify), Duration::from_secs(5))]).unwrap(),
    );
    let retry_policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(10), max_delay: Duration::from_millis(50), exponential_backoff: true };
    let engine = SagaEngine::new(pool.clone(), event_log.clone(), registry, retry_policy, Duration::from_secs(3));

    let aggregate_id = unique_aggregate_id();
    event_log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"user_id": "u1", "filename": "p.jpg"}))
        .await
        .unwrap();
    engine.tick().await.unwrap();

    let saga = find_saga_for_aggregate(&pool, &aggregate_id).unwrap();
    let steps = step_rows(&pool, saga.id);
    let process_step = steps.iter().find(|s| s.step_name == "process_media").unwrap();
    assert_eq!(process_step.status, StepStatus::Completed.to_string());
    assert_eq!(process_step.retry_count, 2);
    assert_eq!(saga_row(&pool, saga.id).current_step, "process_media");
}

/// Seed scenario S6: a saga stuck `in_progress` past the staleness
/// threshold is forced to `failed` by the stuck-saga detector.
#[tokio::test]
async fn stuck_in_progress_saga_is_forced_to_failed() {
    let Some(pool) = test_pool() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL configured");
        return;
    };
    let event_log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    let process = always_ok_server().await;
    let album = always_ok_server().await;
    let notify = always_ok_server().await;
    let registry = Arc::new(
        SagaRegistry::new(vec![media_upload_workflow(&collaborators(&process, &album, &notify), Duration::from_secs(5))]).unwrap(),
    );
    let engine = SagaEngine::new(pool.clone(), event_log.clone(), registry.clone(), RetryPolicy::default(), Duration::from_secs(3));

    let aggregate_id = unique_aggregate_id();
    event_log
        .append(&aggregate_id, AggregateType::Media, EventType::MediaUploaded, serde_json::json!({"user_id": "u1", "filename": "p.jpg"}))
        .await
        .unwrap();
    engine.tick().await.unwrap();
    let saga = find_saga_for_aggregate(&pool, &aggregate_id).unwrap();
    assert_eq!(saga.status, SagaStatus::InProgress.to_string());

    // Simulate staleness: push updated_at 10 minutes into the past.
    {
        use media_store::schema::sagas;
        let mut conn = pool.get().unwrap();
        let ten_minutes_ago = chrono::Utc::now() - chrono::Duration::minutes(10);
        diesel::update(sagas::table.filter(sagas::id.eq(saga.id)))
            .set(sagas::updated_at.eq(ten_minutes_ago))
            .execute(&mut conn)
            .unwrap();
    }

    let detector = StuckSagaDetector::new(pool.clone(), registry, Duration::from_secs(60), Duration::from_secs(5 * 60));
    let forced = detector.sweep().await.unwrap();
    assert_eq!(forced, 1);

    let saga = saga_row(&pool, saga.id);
    assert_eq!(saga.status, SagaStatus::Failed.to_string());
}

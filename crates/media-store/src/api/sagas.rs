//! Saga control surface (spec.md section 6): read-only observability
//! plus manual event injection for tests and bridging other services.

use actix_web::{get, post, web, HttpResponse};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::session::DbPool;
use crate::events::{AggregateType, Event, EventType};
use crate::saga::SagaEngine;
use crate::saga::{SagaRow, SagaStatus, SagaStepRow};
use crate::schema::{saga_steps, sagas};

fn error_body(message: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "error": message.to_string() })
}

/// `GET /sagas`: every non-terminal saga instance.
#[get("/sagas")]
pub async fn list_active(pool: web::Data<DbPool>) -> HttpResponse {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => return HttpResponse::InternalServerError().json(error_body(e)),
    };

    let active: Result<Vec<SagaRow>, diesel::result::Error> = sagas::table
        .filter(sagas::status.ne(SagaStatus::Completed.to_string()))
        .filter(sagas::status.ne(SagaStatus::Failed.to_string()))
        .order_by(sagas::started_at.asc())
        .select(SagaRow::as_select())
        .load(&mut conn);

    match active {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

#[derive(Debug, Serialize)]
struct SagaDetail {
    #[serde(flatten)]
    saga: SagaRow,
    steps: Vec<SagaStepRow>,
}

/// `GET /sagas/{id}`: one saga plus its full step history.
#[get("/sagas/{id}")]
pub async fn get_detail(pool: web::Data<DbPool>, path: web::Path<Uuid>) -> HttpResponse {
    let saga_id = path.into_inner();
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => return HttpResponse::InternalServerError().json(error_body(e)),
    };

    let saga = sagas::table
        .filter(sagas::id.eq(saga_id))
        .select(SagaRow::as_select())
        .first::<SagaRow>(&mut conn)
        .optional();

    let saga = match saga {
        Ok(Some(s)) => s,
        Ok(None) => return HttpResponse::NotFound().json(error_body(format!("no saga {saga_id}"))),
        Err(e) => return HttpResponse::InternalServerError().json(error_body(e)),
    };

    let steps = saga_steps::table
        .filter(saga_steps::saga_id.eq(saga_id))
        .order_by(saga_steps::started_at.asc())
        .select(SagaStepRow::as_select())
        .load::<SagaStepRow>(&mut conn);

    match steps {
        Ok(steps) => HttpResponse::Ok().json(SagaDetail { saga, steps }),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

/// `POST /events/notify`: drives the saga engine's dispatch logic with a
/// synthetic event that is never written to the log, so tests and
/// bridge integrations can force a state transition without waiting for
/// the engine's next poll.
#[post("/events/notify")]
pub async fn notify(engine: web::Data<Arc<SagaEngine>>, body: web::Json<NotifyRequest>) -> HttpResponse {
    let req = body.into_inner();

    let aggregate_type: AggregateType = match req.aggregate_type.parse() {
        Ok(t) => t,
        Err(e) => return HttpResponse::BadRequest().json(error_body(e)),
    };
    let event_type: EventType = match req.event_type.parse() {
        Ok(t) => t,
        Err(e) => return HttpResponse::BadRequest().json(error_body(e)),
    };

    let event = Event {
        id: Uuid::new_v4(),
        aggregate_id: req.aggregate_id,
        aggregate_type,
        event_type,
        data: req.data,
        version: 0,
        checksum: String::new(),
        created_at: chrono::Utc::now(),
    };

    match engine.notify(&event).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "notified": true })),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_active).service(get_detail).service(notify);
}

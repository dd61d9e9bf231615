//! The log's HTTP surface (spec.md section 6, "Log HTTP surface").
//!
//! This is the wire protocol sagas, projectors, and command services use
//! to reach the event log; there is no other way in.

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use media_core::auth::BearerDecoder;
use serde::Deserialize;

use crate::events::{AggregateType, EventLog, EventType};

/// Best-effort caller attribution for request logs: the gateway in front
/// of this service has already authenticated the request, so a missing
/// or undecodable header is logged and ignored rather than rejected.
fn caller_user_id(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("authorization")?.to_str().ok()?;
    match BearerDecoder::user_id_from_header(header) {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            tracing::debug!(error = %e, "could not decode bearer token for request attribution");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: DateTime<Utc>,
}

fn error_body(message: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "error": message.to_string() })
}

/// `POST /events`. 201 on success, 409 on version conflict, 400 on bad input.
#[post("/events")]
pub async fn append_event(
    http_req: HttpRequest,
    log: web::Data<std::sync::Arc<dyn EventLog>>,
    body: web::Json<AppendRequest>,
) -> HttpResponse {
    let req = body.into_inner();
    let caller = caller_user_id(&http_req);

    let aggregate_type: AggregateType = match req.aggregate_type.parse() {
        Ok(t) => t,
        Err(e) => return HttpResponse::BadRequest().json(error_body(e)),
    };
    let event_type: EventType = match req.event_type.parse() {
        Ok(t) => t,
        Err(e) => return HttpResponse::BadRequest().json(error_body(e)),
    };

    match log.append(&req.aggregate_id, aggregate_type, event_type, req.data).await {
        Ok(event) => {
            crate::metrics::EVENTS_APPENDED_TOTAL.inc();
            tracing::info!(
                aggregate_id = %event.aggregate_id,
                event_type = %event.event_type,
                version = event.version,
                caller = ?caller,
                "appended event"
            );
            HttpResponse::Created().json(event)
        }
        Err(media_core::CoreError::VersionConflict { aggregate_id, expected, actual }) => {
            HttpResponse::Conflict().json(error_body(format!(
                "version conflict for aggregate {aggregate_id}: expected {expected}, got {actual}"
            )))
        }
        Err(media_core::CoreError::InvalidRequest { message }) => {
            HttpResponse::BadRequest().json(error_body(message))
        }
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

/// `GET /events/aggregate/{id}`.
#[get("/events/aggregate/{id}")]
pub async fn get_by_aggregate(
    log: web::Data<std::sync::Arc<dyn EventLog>>,
    path: web::Path<String>,
) -> HttpResponse {
    match log.get_by_aggregate(&path.into_inner()).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

/// `GET /events/aggregate/{id}/version`.
#[get("/events/aggregate/{id}/version")]
pub async fn get_latest_version(
    log: web::Data<std::sync::Arc<dyn EventLog>>,
    path: web::Path<String>,
) -> HttpResponse {
    match log.get_latest_version(&path.into_inner()).await {
        Ok(version) => HttpResponse::Ok().json(serde_json::json!({ "version": version })),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

/// `GET /events/type/{t}`.
#[get("/events/type/{t}")]
pub async fn get_by_type(
    log: web::Data<std::sync::Arc<dyn EventLog>>,
    path: web::Path<String>,
) -> HttpResponse {
    let event_type: EventType = match path.into_inner().parse() {
        Ok(t) => t,
        Err(e) => return HttpResponse::BadRequest().json(error_body(e)),
    };
    match log.get_by_type(event_type).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

/// `GET /events/since?since=RFC3339`.
#[get("/events/since")]
pub async fn get_since(
    log: web::Data<std::sync::Arc<dyn EventLog>>,
    query: web::Query<SinceQuery>,
) -> HttpResponse {
    match log.get_since(query.since).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

/// `GET /events` — full scan, for rebuild only.
#[get("/events")]
pub async fn get_all(log: web::Data<std::sync::Arc<dyn EventLog>>) -> HttpResponse {
    match log.get_all().await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(append_event)
        .service(get_by_aggregate)
        .service(get_latest_version)
        .service(get_by_type)
        .service(get_since)
        .service(get_all);
}

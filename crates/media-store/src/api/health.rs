//! Health and readiness endpoints (SPEC_FULL.md section F): not named in
//! spec.md's HTTP surface, but ambient observability an orchestrator
//! needs to tell "process up" apart from "background loops wedged".

use actix_web::{get, web, HttpResponse};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::session::DbPool;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

/// `GET /health`: process liveness only.
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthBody { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(Debug, Serialize)]
struct ReadyBody {
    ready: bool,
    database: &'static str,
}

/// `GET /ready`: can this process actually serve the log's HTTP
/// surface — i.e. is the database reachable.
#[get("/ready")]
pub async fn ready(pool: web::Data<DbPool>) -> HttpResponse {
    let database_ok = pool
        .get()
        .ok()
        .and_then(|mut conn| diesel::sql_query("SELECT 1").execute(&mut conn).ok())
        .is_some();

    let body = ReadyBody { ready: database_ok, database: if database_ok { "reachable" } else { "unreachable" } };
    if database_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}

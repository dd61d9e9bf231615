//! `GET /metrics`: Prometheus scrape endpoint for the counters in
//! [`crate::metrics`].

use actix_web::{get, HttpResponse};

#[get("/metrics")]
pub async fn metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(crate::metrics::render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn metrics_endpoint_returns_text() {
        crate::metrics::register_all();
        crate::metrics::EVENTS_APPENDED_TOTAL.inc();

        let app = test::init_service(App::new().service(metrics)).await;
        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("media_events_appended_total"));
    }
}

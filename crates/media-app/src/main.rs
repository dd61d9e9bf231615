use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenvy::dotenv;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_core::config::AppConfig;
use media_store::db::session::init_pool;
use media_store::saga::{workflows::media_upload_workflow, SagaEngine, SagaRegistry, StuckSagaDetector};
use media_store::{api, MediaProjector, PgEventLog};

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()
        .map_err(|e| std::io::Error::other(format!("configuration error: {e}")))?;
    config
        .validate()
        .map_err(|e| std::io::Error::other(format!("configuration validation failed: {e}")))?;

    tracing::info!(host = %config.http.host, port = config.http.port, "starting media-app");

    let pool = init_pool(&config.database_url, 10)
        .map_err(|e| std::io::Error::other(format!("failed to initialize database pool: {e}")))?;

    let event_log: Arc<dyn media_store::EventLog> = Arc::new(PgEventLog::new(pool.clone()));

    let registry = Arc::new(
        SagaRegistry::new(vec![media_upload_workflow(
            &config.collaborators,
            config.engine.collaborator_call_timeout,
        )])
        .map_err(|e| std::io::Error::other(format!("saga registry failed to load: {e}")))?,
    );

    media_store::metrics::register_all();

    let saga_engine = Arc::new(SagaEngine::new(
        pool.clone(),
        event_log.clone(),
        registry.clone(),
        media_core::error::RetryPolicy::default(),
        config.engine.saga_poll_interval,
    ));
    tokio::spawn(saga_engine.clone().run());

    let stuck_detector = StuckSagaDetector::new(
        pool.clone(),
        registry.clone(),
        config.engine.stuck_saga_check_interval,
        config.engine.stuck_saga_threshold,
    );
    tokio::spawn(stuck_detector.run());

    let media_projector =
        MediaProjector::new(pool.clone(), event_log.clone(), config.engine.projector_poll_interval);
    tokio::spawn(media_projector.run());

    let server_url = format!("{}:{}", config.http.host, config.http.port);
    let pool_data = web::Data::new(pool);
    let event_log_data = web::Data::new(event_log);
    let engine_data = web::Data::new(saga_engine);

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(pool_data.clone())
            .app_data(event_log_data.clone())
            .app_data(engine_data.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(api::configure)
    })
    .bind(server_url)?
    .run()
    .await
}

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::StatusCode, response::Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use pcb_part_finder::clients::llm::LlmClient;
use pcb_part_finder::config::{init_tracing, load_config};
use pcb_part_finder::db;
use pcb_part_finder::events::{process_events, EventSender};
use pcb_part_finder::handlers::{health, projects, AppState};
use pcb_part_finder::queue_runner::QueueRunner;
use pcb_part_finder::repositories::store::Store;
use pcb_part_finder::worker::ProjectWorker;

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);
    let config = Arc::new(config);

    info!("pcb-part-finder starting");

    let db = db::establish_connection_from_app_config(&config).await?;
    if config.auto_migrate {
        info!("running pending migrations");
        db::run_migrations(&db).await?;
    }
    let db = Arc::new(db);

    let (event_tx, event_rx) = tokio::sync::mpsc::channel(256);
    let events = EventSender::new(event_tx);
    tokio::spawn(process_events(event_rx));

    let store = Store::new(db.clone());
    let distributor = AppState::build_distributor_client(&config, store.clone());
    let llm = LlmClient::new(
        config.llm_api_base_url.clone(),
        config.llm_api_key.clone(),
        std::time::Duration::from_secs(config.distributor_timeout_secs),
    );

    let state = Arc::new(AppState::new(
        config.clone(),
        store.clone(),
        distributor.clone(),
        llm.clone(),
        events.clone(),
    ));

    health::init_start_time();

    let worker = ProjectWorker::new(store.clone(), distributor, llm, config.worker_pool_width, events.clone());
    let runner = QueueRunner::new(
        store,
        worker,
        std::time::Duration::from_millis(config.queue_poll_interval_ms),
        std::time::Duration::from_secs(config.queue_error_backoff_secs),
        events,
    );
    tokio::spawn(async move {
        runner.run_forever().await;
    });

    let middleware = ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let app = Router::new()
        .nest("/health", health::health_routes())
        .nest("/project", projects::project_routes())
        .fallback(not_found)
        .layer(middleware)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

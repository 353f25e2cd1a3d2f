use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lodgebook::config::AppConfig;
use lodgebook::db;
use lodgebook::handlers;
use lodgebook::services::storage::http::HttpBucketStorage;
use lodgebook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let storage = HttpBucketStorage::new(
        config.storage_url.clone(),
        config.storage_api_key.clone(),
        config.storage_bucket.clone(),
        config.storage_signing_secret.clone(),
    );
    if config.storage_url.is_empty() {
        tracing::warn!("STORAGE_URL not set; ID image uploads will fall back to inline data");
    }

    let (room_events_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        storage: Box::new(storage),
        lookup_cache: Mutex::new(HashMap::new()),
        room_events_tx,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/rooms",
            get(handlers::rooms::list_rooms).post(handlers::rooms::create_room),
        )
        .route("/api/rooms/:id/status", post(handlers::rooms::update_status))
        .route(
            "/api/rooms/:id/pricing",
            post(handlers::rooms::update_pricing),
        )
        .route("/api/guests/lookup", get(handlers::guests::lookup))
        .route("/api/guests/id-image", get(handlers::guests::id_image_url))
        .route(
            "/api/bookings",
            get(handlers::bookings::list_bookings).post(handlers::bookings::create_booking),
        )
        .route(
            "/api/bookings/:id/checkout",
            post(handlers::bookings::checkout_booking),
        )
        .route("/api/dashboard/stats", get(handlers::dashboard::get_stats))
        .route(
            "/api/dashboard/departures",
            get(handlers::dashboard::get_departures),
        )
        .route(
            "/api/dashboard/events",
            get(handlers::dashboard::events_stream),
        )
        .route("/api/export/report", post(handlers::export::export_report))
        .route(
            "/api/export/register",
            post(handlers::export::export_register),
        )
        .route("/api/export/csv", post(handlers::export::export_csv))
        .route("/api/export/archive", post(handlers::export::export_archive))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

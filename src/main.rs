//! Dupescan Backend - near-duplicate audio finder service
//!
//! This is the main entry point for the dupescan backend API.
//! Scans are driven over REST under /api/duplicates.

mod api;
mod config;
mod dedupe;
mod library;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dedupe::scanner::{create_scan_service, ScanService};
use crate::library::{MemoryTrackStore, TrackStore};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TrackStore>,
    pub scan_service: Arc<ScanService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so thresholds and paths come from one place
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let config = Arc::new(config);

    // Initialize tracing with console output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dupescan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Dupescan Backend");
    tracing::info!("Configuration loaded");

    // Load the track index; an absent index is an empty library, not an error
    let index_path = Path::new(&config.track_index_path);
    let store: Arc<dyn TrackStore> = if index_path.exists() {
        let store = MemoryTrackStore::load(index_path)?;
        tracing::info!(tracks = store.len(), index = %config.track_index_path, "Track index loaded");
        Arc::new(store)
    } else {
        tracing::warn!(index = %config.track_index_path, "Track index not found, starting empty");
        Arc::new(MemoryTrackStore::default())
    };

    // Initialize the scan service
    let scan_service = create_scan_service(store.clone(), config.thresholds);
    tracing::info!("Scan service initialized");

    // Build application state
    let state = AppState {
        config: config.clone(),
        store,
        scan_service,
    };

    // Build router
    let app = Router::new()
        // Health endpoints (no prefix)
        .merge(api::health::router())
        // REST API endpoints
        .nest("/api", api::duplicates::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

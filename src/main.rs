mod config;
mod crypto;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod storage;
#[cfg(test)]
mod test_support;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::crypto::Encryptor;
use crate::db::Database;
use crate::services::maintenance;
use crate::storage::StorageManager;

/// Multipart framing allowance on top of the largest accepted file
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub storage: Arc<StorageManager>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secureshare=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SecureShare...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Initialize storage
    let encryptor = Arc::new(Encryptor::from_config(&config.encryption));
    let storage = Arc::new(StorageManager::from_config(&config.storage, encryptor));

    tokio::spawn(maintenance::run_sweep_loop(
        db.clone(),
        storage.as_ref().clone(),
        config.maintenance.clone(),
    ));

    // Create app state
    let state = AppState {
        db,
        config: config.clone(),
        storage,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state
        .config
        .storage
        .max_file_size
        .saturating_add(MULTIPART_OVERHEAD)
        .min(usize::MAX as u64) as usize;

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/public/share/:token", get(handlers::share::get_public_share))
        .route(
            "/public/share/:token/download",
            get(handlers::share::download_public_share),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        // Files
        .route("/files", get(handlers::file::list_files))
        .route("/files/usage", get(handlers::file::storage_usage))
        .route("/files/upload", post(handlers::file::upload_file))
        .route(
            "/files/:id",
            get(handlers::file::inspect_file).delete(handlers::file::delete_file),
        )
        .route("/files/:id/download", get(handlers::file::download_file))
        .route("/files/:id/preview", get(handlers::file::preview_file))
        // Shares
        .route("/shares", post(handlers::share::create_share))
        .route("/shares/my", get(handlers::share::list_my_shares))
        .route("/shares/:token", delete(handlers::share::delete_share))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Combine all routes under /api/v1
    Router::new()
        .nest("/api/v1", public_routes.merge(protected_routes))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

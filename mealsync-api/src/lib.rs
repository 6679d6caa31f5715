//! MealSync API - Per-user KV Proxy
//!
//! Axum server exposing `/api/kv` over a [`BlobStore`]: LMDB when
//! `MEALSYNC_BLOB_PATH` is set, an in-memory map otherwise.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use mealsync_storage::{BlobStore, LmdbBlobStore, MemoryBlobStore};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::AppState;

/// Build the full router: KV routes, health checks, body limit, tracing and CORS.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);
    let body_limit = state.config.body_limit();

    Router::new()
        .merge(routes::kv::create_router())
        .nest("/health", routes::health::create_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Open the blob store the config selects.
pub fn open_blob_store(config: &ApiConfig) -> ApiResult<Arc<dyn BlobStore>> {
    match &config.blob_path {
        Some(path) => {
            let store = LmdbBlobStore::open(path, config.blob_max_size_mb, config.quota_bytes)
                .map_err(|e| {
                    ApiError::internal_error(format!(
                        "Failed to open blob store at {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            tracing::info!(path = %path.display(), quota_bytes = ?config.quota_bytes, "Using LMDB blob store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("MEALSYNC_BLOB_PATH not set, values are kept in memory and lost on restart");
            let store = match config.quota_bytes {
                Some(quota) => MemoryBlobStore::with_quota(quota),
                None => MemoryBlobStore::new(),
            };
            Ok(Arc::new(store))
        }
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Empty origins allow everything (development); otherwise only the listed ones.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.is_production() {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    } else {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    }
}

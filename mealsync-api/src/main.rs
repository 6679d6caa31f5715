//! MealSync API Server Entry Point

use mealsync_api::telemetry::init_tracing;
use mealsync_api::{create_router, open_blob_store, ApiConfig, ApiError, ApiResult, AppState};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = ApiConfig::from_env()?;
    let addr = config.socket_addr()?;
    let store = open_blob_store(&config)?;
    let app = create_router(AppState::new(store, config));

    tracing::info!(%addr, "Starting MealSync API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

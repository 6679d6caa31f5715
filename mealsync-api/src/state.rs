//! Shared handler state.

use std::sync::Arc;
use std::time::Instant;

use mealsync_storage::BlobStore;

use crate::config::ApiConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn BlobStore>, config: ApiConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.store.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

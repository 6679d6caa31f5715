//! MealSync Client
//!
//! Synchronized access to the per-user KV proxy: reads through a TTL cache,
//! writes through a durable local mirror and a debounced per-record queue.
//!
//! ```ignore
//! let config = ClientConfig::load()?;
//! let client = mealsync_client::connect(&config)?;
//!
//! client.set("u1", "profile", json!({"displayName": "Sam"})).await?;
//! let profile = client.get("u1", "profile", Freshness::Cached).await;
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod scheduler;
pub mod transport;

use std::sync::Arc;

pub use client::{Ack, FlushReport, PendingWrite, SyncEvent, SyncKvClient};
pub use config::{ClientConfig, ConfigError};
pub use http::HttpTransport;
pub use mealsync_storage::{CacheRead, CacheStats, Freshness};
pub use scheduler::FlushScheduler;
pub use transport::{KvMethod, KvRequest, KvResponse, KvTransport, TransportError};

use mealsync_core::SyncError;
use mealsync_storage::{DurableMirror, LmdbMirror, MemoryMirror};
use tracing::{info, warn};

/// Client talking HTTP, with whichever mirror the config selects.
pub type HttpSyncClient = SyncKvClient<HttpTransport, Arc<dyn DurableMirror>>;

/// Errors from building a client out of a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Mirror error: {0}")]
    Mirror(#[from] SyncError),
}

/// Build an HTTP client from validated configuration.
///
/// Opens the LMDB mirror when `mirror_path` is set, otherwise keeps the
/// mirror in memory.
pub fn connect(config: &ClientConfig) -> Result<HttpSyncClient, ClientError> {
    config.validate()?;
    let transport = HttpTransport::from_config(config)?;

    let mirror: Arc<dyn DurableMirror> = match &config.mirror_path {
        Some(path) => {
            let mirror = LmdbMirror::open(path, config.mirror_max_size_mb)
                .map_err(SyncError::from)?;
            info!(path = %path.display(), "Opened LMDB mirror");
            Arc::new(mirror)
        }
        None => {
            warn!("No mirror_path configured, offline fallback will not survive restarts");
            Arc::new(MemoryMirror::new())
        }
    };

    Ok(SyncKvClient::new(transport, mirror, config.sync.clone())?)
}

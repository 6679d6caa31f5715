//! API Configuration Module
//!
//! Bind address, blob store backend, payload limits and CORS, read from
//! environment variables with development defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use mealsync_core::DEFAULT_MAX_PAYLOAD_BYTES;

use crate::error::{ApiError, ApiResult};

/// Room for the `{"value": ...}` envelope on top of the value itself.
const ENVELOPE_ALLOWANCE: usize = 1024;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,

    /// LMDB directory for the blob store. `None` keeps blobs in memory.
    pub blob_path: Option<PathBuf>,
    pub blob_max_size_mb: usize,
    /// Total bytes the store may hold. `None` is unlimited.
    pub quota_bytes: Option<u64>,

    /// Largest serialized value accepted on POST.
    pub max_payload_bytes: usize,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            blob_path: None,
            blob_max_size_mb: 1024,
            quota_bytes: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `MEALSYNC_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` or `MEALSYNC_API_PORT`: Listen port (default: 3000)
    /// - `MEALSYNC_BLOB_PATH`: LMDB directory (unset = in-memory store)
    /// - `MEALSYNC_BLOB_MAX_SIZE_MB`: LMDB map size (default: 1024)
    /// - `MEALSYNC_QUOTA_BYTES`: Store quota (unset = unlimited)
    /// - `MEALSYNC_MAX_PAYLOAD_BYTES`: Largest accepted value (default: 4 MiB)
    /// - `MEALSYNC_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `MEALSYNC_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT").or_else(|| lookup("MEALSYNC_API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => defaults.port,
        };

        let cors_origins = lookup("MEALSYNC_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_host: lookup("MEALSYNC_API_BIND").unwrap_or(defaults.bind_host),
            port,
            blob_path: lookup("MEALSYNC_BLOB_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            blob_max_size_mb: lookup("MEALSYNC_BLOB_MAX_SIZE_MB")
                .and_then(|s| s.parse().ok())
                .filter(|mb| *mb > 0)
                .unwrap_or(defaults.blob_max_size_mb),
            quota_bytes: lookup("MEALSYNC_QUOTA_BYTES").and_then(|s| s.parse().ok()),
            max_payload_bytes: lookup("MEALSYNC_MAX_PAYLOAD_BYTES")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_payload_bytes),
            cors_origins,
            cors_max_age_secs: lookup("MEALSYNC_CORS_MAX_AGE_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
        })
    }

    pub fn socket_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })
    }

    /// Request body limit: the value limit plus the JSON envelope.
    pub fn body_limit(&self) -> usize {
        self.max_payload_bytes.saturating_add(ENVELOPE_ALLOWANCE)
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}

//! Remote blob stores behind the KV proxy.
//!
//! Paths look like `users/{owner}/{key}.json`. Bodies are opaque bytes; the
//! proxy decides what goes in them.

mod lmdb;
mod memory;

pub use lmdb::LmdbBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use mealsync_core::{parse_blob_path, Timestamp};
use serde::Serialize;

/// Error type for blob store operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    /// The store is out of space for this write.
    #[error("Storage quota exceeded: {used} of {limit} bytes in use")]
    QuotaExceeded { used: u64, limit: u64 },

    #[error("Blob backend error: {0}")]
    Backend(String),
}

impl From<crate::lmdb::LmdbError> for BlobError {
    fn from(e: crate::lmdb::LmdbError) -> Self {
        BlobError::Backend(e.to_string())
    }
}

/// Metadata about a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    pub path: String,
    pub size: u64,
    pub uploaded_at: Timestamp,
}

/// Namespaced object store.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Store `body` at `path`, replacing any existing blob.
    async fn put(&self, path: &str, body: Vec<u8>) -> Result<BlobMeta, BlobError>;

    /// Remove the blob. Returns whether one was present.
    async fn delete(&self, path: &str) -> Result<bool, BlobError>;

    /// All blobs whose path starts with `prefix`, sorted by path.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError>;

    async fn health_check(&self) -> Result<(), BlobError>;

    fn backend_name(&self) -> &'static str;
}

/// Reject anything that is not a well-formed record path.
pub(crate) fn check_path(path: &str) -> Result<(), BlobError> {
    match parse_blob_path(path) {
        Some(_) => Ok(()),
        None => Err(BlobError::InvalidPath(path.to_string())),
    }
}

/// Check a write against an optional quota.
///
/// `replaced` is the size of the blob being overwritten, which is freed by
/// the same write.
pub(crate) fn check_quota(
    quota: Option<u64>,
    used: u64,
    replaced: u64,
    incoming: u64,
) -> Result<(), BlobError> {
    if let Some(limit) = quota {
        let after = used.saturating_sub(replaced).saturating_add(incoming);
        if after > limit {
            return Err(BlobError::QuotaExceeded { used, limit });
        }
    }
    Ok(())
}

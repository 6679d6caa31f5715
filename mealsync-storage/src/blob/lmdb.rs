//! Persistent blob store on LMDB.
//!
//! Value format: `[uploaded_at millis: 8 bytes LE][body]`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::{Bytes, Str};
use heed::{Database, Env};
use tracing::debug;

use super::{check_path, check_quota, BlobError, BlobMeta, BlobStore};
use crate::lmdb::{open_env, LmdbError};

const HEADER_LEN: usize = 8;

pub struct LmdbBlobStore {
    env: Env,
    db: Database<Str, Bytes>,
    used_bytes: AtomicU64,
    quota_bytes: Option<u64>,
}

impl LmdbBlobStore {
    /// Open or create a blob store under `path`.
    ///
    /// Usage is recomputed from the stored blobs so the quota holds across
    /// restarts.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        quota_bytes: Option<u64>,
    ) -> Result<Self, LmdbError> {
        let env = open_env(path, max_size_mb, 1)?;

        let mut wtxn = env.write_txn().map_err(LmdbError::txn)?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(LmdbError::txn)?;

        let used = {
            let rtxn = env.read_txn().map_err(LmdbError::txn)?;
            let mut used = 0u64;
            for result in db.iter(&rtxn).map_err(LmdbError::txn)? {
                let (_, bytes) = result.map_err(LmdbError::txn)?;
                used += body_len(bytes);
            }
            used
        };
        debug!(used_bytes = used, "Opened LMDB blob store");

        Ok(Self {
            env,
            db,
            used_bytes: AtomicU64::new(used),
            quota_bytes,
        })
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    fn decode_meta(path: &str, bytes: &[u8]) -> Result<BlobMeta, BlobError> {
        let uploaded_at = decode_timestamp(bytes).ok_or_else(|| {
            BlobError::Backend(format!("Corrupt blob header for {}", path))
        })?;
        Ok(BlobMeta {
            path: path.to_string(),
            size: body_len(bytes),
            uploaded_at,
        })
    }
}

impl std::fmt::Debug for LmdbBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbBlobStore")
            .field("path", &self.env.path())
            .field("used_bytes", &self.used_bytes())
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}

fn body_len(bytes: &[u8]) -> u64 {
    bytes.len().saturating_sub(HEADER_LEN) as u64
}

fn decode_timestamp(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let header: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
    DateTime::from_timestamp_millis(i64::from_le_bytes(header))
}

#[async_trait]
impl BlobStore for LmdbBlobStore {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        check_path(path)?;
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;

        match self.db.get(&rtxn, path).map_err(LmdbError::txn)? {
            Some(bytes) if bytes.len() >= HEADER_LEN => Ok(Some(bytes[HEADER_LEN..].to_vec())),
            Some(_) => Err(BlobError::Backend(format!("Corrupt blob header for {}", path))),
            None => Ok(None),
        }
    }

    async fn put(&self, path: &str, body: Vec<u8>) -> Result<BlobMeta, BlobError> {
        check_path(path)?;
        let uploaded_at = Utc::now();

        let mut full_bytes = Vec::with_capacity(HEADER_LEN + body.len());
        full_bytes.extend_from_slice(&uploaded_at.timestamp_millis().to_le_bytes());
        full_bytes.extend_from_slice(&body);

        // The write transaction serializes writers, so the quota check and the
        // counter update see a consistent view.
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        let replaced = self
            .db
            .get(&wtxn, path)
            .map_err(LmdbError::txn)?
            .map(body_len)
            .unwrap_or(0);
        check_quota(self.quota_bytes, self.used_bytes(), replaced, body.len() as u64)?;

        self.db
            .put(&mut wtxn, path, &full_bytes)
            .map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)?;

        self.used_bytes.fetch_sub(replaced, Ordering::Relaxed);
        self.used_bytes.fetch_add(body.len() as u64, Ordering::Relaxed);

        Ok(BlobMeta {
            path: path.to_string(),
            size: body.len() as u64,
            uploaded_at,
        })
    }

    async fn delete(&self, path: &str) -> Result<bool, BlobError> {
        check_path(path)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        let freed = self
            .db
            .get(&wtxn, path)
            .map_err(LmdbError::txn)?
            .map(body_len);
        let deleted = self.db.delete(&mut wtxn, path).map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)?;

        if let Some(freed) = freed {
            self.used_bytes.fetch_sub(freed, Ordering::Relaxed);
        }
        Ok(deleted)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let iter = self.db.prefix_iter(&rtxn, prefix).map_err(LmdbError::txn)?;

        let mut listed = Vec::new();
        for result in iter {
            let (path, bytes) = result.map_err(LmdbError::txn)?;
            listed.push(Self::decode_meta(path, bytes)?);
        }
        Ok(listed)
    }

    async fn health_check(&self) -> Result<(), BlobError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        self.db.len(&rtxn).map_err(LmdbError::txn)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}

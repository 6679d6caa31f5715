//! Shared LMDB environment handling.
//!
//! Both the durable mirror and the persistent blob store sit on top of a
//! heed environment opened the same way.

use std::path::Path;

use heed::{Env, EnvOpenOptions};
use mealsync_core::{StorageError, SyncError};

/// Error type for LMDB-backed stores.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmdbError {
    pub(crate) fn txn(e: heed::Error) -> Self {
        LmdbError::Transaction(e.to_string())
    }
}

impl From<LmdbError> for StorageError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::Serialization(reason) | LmdbError::Deserialization(reason) => {
                StorageError::Serialization { reason }
            }
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<LmdbError> for SyncError {
    fn from(e: LmdbError) -> Self {
        SyncError::Storage(e.into())
    }
}

/// Open (creating if needed) an LMDB environment under `path`.
pub fn open_env<P: AsRef<Path>>(path: P, max_size_mb: usize, max_dbs: u32) -> Result<Env, LmdbError> {
    std::fs::create_dir_all(&path)?;

    // SAFETY: each environment directory is opened once per process by the
    // store that owns it.
    unsafe {
        EnvOpenOptions::new()
            .map_size(max_size_mb * 1024 * 1024)
            .max_dbs(max_dbs)
            .open(path.as_ref())
    }
    .map_err(|e| LmdbError::EnvOpen(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_env_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("env");
        let env = open_env(&path, 8, 1);
        assert!(env.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_lmdb_error_converts_to_sync_error() {
        let err: SyncError = LmdbError::Deserialization("bad json".into()).into();
        assert!(matches!(
            err,
            SyncError::Storage(StorageError::Serialization { .. })
        ));

        let err: SyncError = LmdbError::Transaction("MDB_MAP_FULL".into()).into();
        assert!(err.to_string().contains("MDB_MAP_FULL"));
    }
}

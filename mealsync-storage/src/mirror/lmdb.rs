//! LMDB-backed durable mirror.
//!
//! One unnamed database, keys are `{owner}_{key}` and values are the JSON
//! encoding of [`MirrorEntry`].

use std::path::Path;

use heed::types::{Bytes, Str};
use heed::{Database, Env};
use mealsync_core::{OwnerId, RecordKey, RecordRef, RecordValue, SyncResult};
use tracing::warn;

use super::{DurableMirror, MirrorEntry};
use crate::lmdb::{open_env, LmdbError};

pub struct LmdbMirror {
    env: Env,
    db: Database<Str, Bytes>,
}

impl LmdbMirror {
    /// Open or create a mirror under `path`.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbError> {
        let env = open_env(path, max_size_mb, 1)?;

        let mut wtxn = env.write_txn().map_err(LmdbError::txn)?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(LmdbError::txn)?;

        Ok(Self { env, db })
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<MirrorEntry, LmdbError> {
        serde_json::from_slice(bytes)
            .map_err(|e| LmdbError::Deserialization(format!("{}: {}", key, e)))
    }
}

impl std::fmt::Debug for LmdbMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbMirror")
            .field("path", &self.env.path())
            .finish()
    }
}

impl DurableMirror for LmdbMirror {
    fn get(&self, record: &RecordRef) -> SyncResult<Option<MirrorEntry>> {
        let mirror_key = record.mirror_key();
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;

        match self.db.get(&rtxn, &mirror_key).map_err(LmdbError::txn)? {
            Some(bytes) => {
                let entry = Self::decode(&mirror_key, bytes)?;
                Ok(entry.matches(record).then_some(entry))
            }
            None => Ok(None),
        }
    }

    fn put(&self, record: &RecordRef, value: &RecordValue) -> SyncResult<()> {
        let entry = MirrorEntry::new(record, value.clone());
        let bytes =
            serde_json::to_vec(&entry).map_err(|e| LmdbError::Serialization(e.to_string()))?;

        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        self.db
            .put(&mut wtxn, &record.mirror_key(), &bytes)
            .map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)?;
        Ok(())
    }

    fn delete(&self, record: &RecordRef) -> SyncResult<bool> {
        let mirror_key = record.mirror_key();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;

        let owned = match self.db.get(&wtxn, &mirror_key).map_err(LmdbError::txn)? {
            Some(bytes) => match Self::decode(&mirror_key, bytes) {
                Ok(entry) => entry.matches(record),
                Err(e) => {
                    warn!(mirror_key = %mirror_key, error = %e, "Deleting unreadable mirror entry");
                    true
                }
            },
            None => false,
        };
        if !owned {
            return Ok(false);
        }

        let deleted = self
            .db
            .delete(&mut wtxn, &mirror_key)
            .map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)?;
        Ok(deleted)
    }

    fn keys(&self, owner: &OwnerId) -> SyncResult<Vec<RecordKey>> {
        let prefix = format!("{}_", owner);
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let iter = self
            .db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::txn)?;

        let mut keys = Vec::new();
        for result in iter {
            let (mirror_key, bytes) = result.map_err(LmdbError::txn)?;
            match Self::decode(mirror_key, bytes) {
                Ok(entry) if &entry.owner_id == owner => keys.push(entry.key),
                Ok(_) => {}
                Err(e) => warn!(mirror_key, error = %e, "Skipping unreadable mirror entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn len(&self) -> SyncResult<usize> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let count = self.db.len(&rtxn).map_err(LmdbError::txn)?;
        Ok(count as usize)
    }
}

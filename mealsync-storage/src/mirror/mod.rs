//! Durable local mirror.
//!
//! Every `set` and `delete` lands here before anything else happens, and
//! reads fall back to it when the remote store is unreachable. The mirror is
//! synchronous: its operations never suspend.

mod lmdb;
mod memory;

pub use lmdb::LmdbMirror;
pub use memory::MemoryMirror;

use std::sync::Arc;

use chrono::Utc;
use mealsync_core::{OwnerId, RecordKey, RecordRef, RecordValue, SyncResult, Timestamp};
use serde::{Deserialize, Serialize};

/// What the mirror stores under `{owner}_{key}`.
///
/// Owner and key are kept alongside the value because the flat mirror key
/// cannot be split back apart when an owner id contains `_`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorEntry {
    pub owner_id: OwnerId,
    pub key: RecordKey,
    pub value: RecordValue,
    pub written_at: Timestamp,
}

impl MirrorEntry {
    pub fn new(record: &RecordRef, value: RecordValue) -> Self {
        Self {
            owner_id: record.owner().clone(),
            key: record.key().clone(),
            value,
            written_at: Utc::now(),
        }
    }

    /// Whether this envelope belongs to `record`.
    pub fn matches(&self, record: &RecordRef) -> bool {
        &self.owner_id == record.owner() && &self.key == record.key()
    }
}

/// Local persistent copy of records.
pub trait DurableMirror: Send + Sync + 'static {
    /// Read the entry for `record`, if one was written.
    fn get(&self, record: &RecordRef) -> SyncResult<Option<MirrorEntry>>;

    /// Replace the entry for `record`.
    fn put(&self, record: &RecordRef, value: &RecordValue) -> SyncResult<()>;

    /// Remove the entry. Returns whether one was present. A slot holding a
    /// different record under the same mirror key is left alone.
    fn delete(&self, record: &RecordRef) -> SyncResult<bool>;

    /// Keys stored for `owner`, sorted.
    fn keys(&self, owner: &OwnerId) -> SyncResult<Vec<RecordKey>>;

    fn len(&self) -> SyncResult<usize>;

    fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl<M: DurableMirror + ?Sized> DurableMirror for Arc<M> {
    fn get(&self, record: &RecordRef) -> SyncResult<Option<MirrorEntry>> {
        (**self).get(record)
    }

    fn put(&self, record: &RecordRef, value: &RecordValue) -> SyncResult<()> {
        (**self).put(record, value)
    }

    fn delete(&self, record: &RecordRef) -> SyncResult<bool> {
        (**self).delete(record)
    }

    fn keys(&self, owner: &OwnerId) -> SyncResult<Vec<RecordKey>> {
        (**self).keys(owner)
    }

    fn len(&self) -> SyncResult<usize> {
        (**self).len()
    }
}

use std::collections::BTreeMap;
use std::sync::RwLock;

use mealsync_core::{OwnerId, RecordKey, RecordRef, RecordValue, StorageError, SyncResult};

use super::{DurableMirror, MirrorEntry};

/// Mirror held in process memory.
///
/// Used where nothing has to survive a restart: tests, and clients that
/// were not given a mirror directory.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    entries: RwLock<BTreeMap<String, MirrorEntry>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableMirror for MemoryMirror {
    fn get(&self, record: &RecordRef) -> SyncResult<Option<MirrorEntry>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries
            .get(&record.mirror_key())
            .filter(|entry| entry.matches(record))
            .cloned())
    }

    fn put(&self, record: &RecordRef, value: &RecordValue) -> SyncResult<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(record.mirror_key(), MirrorEntry::new(record, value.clone()));
        Ok(())
    }

    fn delete(&self, record: &RecordRef) -> SyncResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let mirror_key = record.mirror_key();
        // The slot may hold a colliding record.
        if !entries.get(&mirror_key).is_some_and(|entry| entry.matches(record)) {
            return Ok(false);
        }
        Ok(entries.remove(&mirror_key).is_some())
    }

    fn keys(&self, owner: &OwnerId) -> SyncResult<Vec<RecordKey>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut keys: Vec<RecordKey> = entries
            .values()
            .filter(|entry| &entry.owner_id == owner)
            .map(|entry| entry.key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn len(&self) -> SyncResult<usize> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_delete() {
        let mirror = MemoryMirror::new();
        let record = RecordRef::parse("u1", "profile").unwrap();

        assert!(mirror.get(&record).unwrap().is_none());
        mirror.put(&record, &json!({"a": 1})).unwrap();
        assert_eq!(mirror.get(&record).unwrap().unwrap().value, json!({"a": 1}));

        assert!(mirror.delete(&record).unwrap());
        assert!(!mirror.delete(&record).unwrap());
        assert!(mirror.is_empty().unwrap());
    }

    #[test]
    fn test_underscore_collision_is_not_served() {
        let mirror = MemoryMirror::new();
        let a = RecordRef::parse("a_b", "c").unwrap();
        let b = RecordRef::parse("a", "b_c").unwrap();
        assert_eq!(a.mirror_key(), b.mirror_key());

        mirror.put(&a, &json!(1)).unwrap();
        assert!(mirror.get(&b).unwrap().is_none());
        assert!(mirror.keys(&OwnerId::new("a").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_leaves_colliding_entry() {
        let mirror = MemoryMirror::new();
        let kept = RecordRef::parse("a_b", "c").unwrap();
        let other = RecordRef::parse("a", "b_c").unwrap();

        mirror.put(&kept, &json!("keep me")).unwrap();
        assert!(!mirror.delete(&other).unwrap());
        assert_eq!(
            mirror.get(&kept).unwrap().map(|e| e.value),
            Some(json!("keep me"))
        );
        assert!(mirror.delete(&kept).unwrap());
    }
}

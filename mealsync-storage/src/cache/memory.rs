//! In-memory record cache with a fixed TTL.
//!
//! Entries are keyed by `{owner}:{key}`. An entry is served only while it is
//! younger than the TTL; an expired entry is removed on the read that finds
//! it and counted as a miss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mealsync_core::{OwnerId, RecordRef, RecordValue};
use tokio::time::Instant;

use super::freshness::CacheRead;
use super::stats::CacheStats;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: RecordValue,
    /// Monotonic fetch time, used for TTL checks.
    fetched_at: Instant,
    /// Wall-clock fetch time, reported to callers.
    cached_at: DateTime<Utc>,
}

/// Process-local cache of record values.
#[derive(Debug)]
pub struct RecordCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl RecordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a fresh entry, or `None` if absent or expired.
    pub fn get(&self, record: &RecordRef) -> Option<CacheRead<RecordValue>> {
        let cache_key = record.cache_key();

        let expired = match self.entries.get(&cache_key) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(CacheRead::from_cache(entry.value.clone(), entry.cached_at));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // Only remove if nobody refreshed it in between.
            let ttl = self.ttl;
            if self
                .entries
                .remove_if(&cache_key, |_, entry| entry.fetched_at.elapsed() >= ttl)
                .is_some()
            {
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace an entry, stamping it with the current time.
    pub fn put(&self, record: &RecordRef, value: RecordValue) {
        self.entries.insert(
            record.cache_key(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                cached_at: Utc::now(),
            },
        );
    }

    /// Remove an entry. Returns whether one was present.
    pub fn remove(&self, record: &RecordRef) -> bool {
        self.entries.remove(&record.cache_key()).is_some()
    }

    /// Drop every entry belonging to `owner`.
    pub fn invalidate_owner(&self, owner: &OwnerId) -> u64 {
        let prefix = format!("{}:", owner);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        (before - self.entries.len()) as u64
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(owner: &str, key: &str) -> RecordRef {
        RecordRef::parse(owner, key).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_served() {
        let cache = RecordCache::new(Duration::from_secs(300));
        let profile = record("u1", "profile");
        cache.put(&profile, json!({"a": 1}));

        tokio::time::advance(Duration::from_secs(299)).await;
        let read = cache.get(&profile).expect("entry should still be fresh");
        assert!(read.was_cache_hit());
        assert_eq!(read.into_value(), json!({"a": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache = RecordCache::new(Duration::from_secs(300));
        let profile = record("u1", "profile");
        cache.put(&profile, json!({"a": 1}));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(cache.get(&profile).is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_refreshes_timestamp() {
        let cache = RecordCache::new(Duration::from_secs(10));
        let profile = record("u1", "profile");
        cache.put(&profile, json!(1));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put(&profile, json!(2));
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&profile).map(|r| r.into_value()), Some(json!(2)));
    }

    #[test]
    fn test_null_is_a_cached_value() {
        let cache = RecordCache::new(Duration::from_secs(300));
        let profile = record("u1", "profile");
        cache.put(&profile, serde_json::Value::Null);
        assert_eq!(
            cache.get(&profile).map(|r| r.into_value()),
            Some(serde_json::Value::Null)
        );
    }

    #[test]
    fn test_invalidate_owner_is_scoped() {
        let cache = RecordCache::new(Duration::from_secs(300));
        cache.put(&record("u1", "profile"), json!(1));
        cache.put(&record("u1", "pantry"), json!(2));
        cache.put(&record("u10", "profile"), json!(3));

        let removed = cache.invalidate_owner(&OwnerId::new("u1").unwrap());
        assert_eq!(removed, 2);
        assert!(cache.get(&record("u10", "profile")).is_some());
    }

    #[test]
    fn test_stats() {
        let cache = RecordCache::new(Duration::from_secs(300));
        let profile = record("u1", "profile");
        assert!(cache.get(&profile).is_none());
        cache.put(&profile, json!(1));
        cache.get(&profile);
        cache.get(&profile);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert!(cache.remove(&profile));
        assert!(!cache.remove(&profile));
    }

    proptest! {
        #[test]
        fn prop_entries_do_not_alias(
            owner in "[a-z0-9]{1,8}",
            key_a in "[a-zA-Z]{1,8}",
            key_b in "[a-zA-Z]{1,8}",
        ) {
            prop_assume!(key_a != key_b);
            let cache = RecordCache::new(Duration::from_secs(300));
            cache.put(&record(&owner, &key_a), json!("a"));
            cache.put(&record(&owner, &key_b), json!("b"));
            prop_assert_eq!(cache.get(&record(&owner, &key_a)).map(|r| r.into_value()), Some(json!("a")));
            prop_assert_eq!(cache.len(), 2);
        }
    }
}

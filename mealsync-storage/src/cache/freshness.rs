//! Freshness contracts for cache reads.
//!
//! Callers state up front whether a cached value is acceptable, and reads
//! come back wrapped in [`CacheRead`] so the caller can see where the value
//! came from and how old it is.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Freshness requirement for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Serve from the cache while the entry is younger than the TTL,
    /// otherwise go to the remote store.
    #[default]
    Cached,

    /// Always go to the remote store, ignoring any cached entry.
    ///
    /// The response still refreshes the cache.
    Remote,
}

impl Freshness {
    /// Map the `skipCache` flag used by older call sites.
    pub fn from_skip_cache(skip_cache: bool) -> Self {
        if skip_cache {
            Self::Remote
        } else {
            Self::Cached
        }
    }

    pub fn allows_cache(&self) -> bool {
        matches!(self, Self::Cached)
    }
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from the cache.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// A value just fetched from the remote store.
    pub fn from_remote(value: T) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// How long ago the value was cached.
    pub fn staleness(&self) -> Duration {
        let now = Utc::now();
        if now > self.cached_at {
            (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_default_is_cached() {
        assert_eq!(Freshness::default(), Freshness::Cached);
        assert!(Freshness::default().allows_cache());
    }

    #[test]
    fn test_freshness_from_skip_cache() {
        assert_eq!(Freshness::from_skip_cache(true), Freshness::Remote);
        assert_eq!(Freshness::from_skip_cache(false), Freshness::Cached);
        assert!(!Freshness::Remote.allows_cache());
    }

    #[test]
    fn test_cache_read_from_cache() {
        let cached_at = Utc::now();
        let read = CacheRead::from_cache("value".to_string(), cached_at);
        assert!(read.was_cache_hit());
        assert_eq!(read.value(), "value");
        assert_eq!(read.cached_at(), cached_at);
    }

    #[test]
    fn test_cache_read_from_remote() {
        let read = CacheRead::from_remote(42i32);
        assert!(read.was_cache_miss());
        assert_eq!(read.into_value(), 42);
    }

    #[test]
    fn test_cache_read_staleness() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let read = CacheRead::from_cache("test", past);
        let staleness = read.staleness();
        assert!(staleness >= Duration::from_secs(4));
        assert!(staleness <= Duration::from_secs(10));
    }

    #[test]
    fn test_cache_read_map() {
        let read = CacheRead::from_remote(42i32).map(|v| v.to_string());
        assert_eq!(read.into_value(), "42");
    }
}

//! MealSync Storage
//!
//! Local and remote persistence layers used by the synchronized client and
//! the KV proxy:
//!
//! - [`cache`]: TTL-bounded in-memory cache of record values
//! - [`mirror`]: durable local copy of every write, the offline fallback
//! - [`blob`]: object stores addressed by `users/{owner}/{key}.json`

pub mod blob;
pub mod cache;
pub mod lmdb;
pub mod mirror;

pub use blob::{BlobError, BlobMeta, BlobStore, LmdbBlobStore, MemoryBlobStore};
pub use cache::{CacheRead, CacheStats, Freshness, RecordCache};
pub use lmdb::LmdbError;
pub use mirror::{DurableMirror, LmdbMirror, MemoryMirror, MirrorEntry};

//! Read-side cache for record values.
//!
//! - [`Freshness`]: whether a read may be served from the cache
//! - [`CacheRead`]: a value plus where it came from
//! - [`RecordCache`]: TTL-bounded in-memory map keyed by `{owner}:{key}`

mod freshness;
mod memory;
mod stats;

pub use freshness::{CacheRead, Freshness};
pub use memory::RecordCache;
pub use stats::CacheStats;

//! MealSync Core - Record Types
//!
//! Addressing, configuration and the error taxonomy shared by the storage
//! layer, the synchronized client and the KV proxy server. This crate has
//! no I/O.

pub mod config;
pub mod error;
pub mod record;
pub mod records;

pub use config::{
    SyncConfig, DEFAULT_CACHE_TTL, DEFAULT_CRITICAL_KEY, DEFAULT_DEBOUNCE_WINDOW,
    DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_RETRY_DELAY,
};
pub use error::{
    ConfigError, FailureClass, RecordError, StorageError, SyncError, SyncResult, WriteError,
};
pub use record::{
    owner_blob_prefix, parse_blob_path, OwnerId, RecordKey, RecordRef, RecordValue, BLOB_ROOT,
    MAX_IDENTIFIER_LEN,
};
pub use records::{
    MealPlan, MealSlot, Pantry, PantryItem, PlannedDay, PlannedMeal, Profile, ShoppingItem,
    ShoppingList, TypedRecord,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier attached to each queued write, for correlating retries in logs.
pub type WriteId = uuid::Uuid;

/// Generate a new UUIDv7 write id (timestamp-sortable).
pub fn new_write_id() -> WriteId {
    uuid::Uuid::now_v7()
}

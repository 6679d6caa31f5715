//! Error types for MealSync operations

use thiserror::Error;

/// Record addressing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Required identifier missing: {field}")]
    Empty { field: &'static str },

    #[error("Identifier {field} is too long: {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid character {ch:?} in {field}")]
    InvalidCharacter { field: &'static str, ch: char },

    #[error("Invalid {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
}

/// Local storage errors (cache, durable mirror).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Corrupt entry under {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for MealSync.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for MealSync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// REMOTE WRITE FAILURES
// =============================================================================

/// How a failed remote call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The record does not exist remotely. Not an error for reads.
    NotFound,
    /// Safe to retry later (network failure, 5xx, 429, ...).
    Transient,
    /// Retrying cannot succeed (400, 413, 507).
    Permanent,
}

impl FailureClass {
    /// Classify an HTTP status code returned by the KV proxy.
    ///
    /// Quota exhaustion (507) is permanent: the fixed retry interval cannot
    /// free space on the remote store.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => FailureClass::NotFound,
            400 | 413 | 507 => FailureClass::Permanent,
            _ => FailureClass::Transient,
        }
    }
}

/// Failure of a remote write, split by whether a retry can help.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("Transient write failure for {record}: {reason}")]
    Transient {
        record: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Permanent write failure for {record}: {reason}")]
    Permanent {
        record: String,
        status: Option<u16>,
        reason: String,
    },
}

impl WriteError {
    /// Build a write error from an HTTP status, using [`FailureClass`].
    ///
    /// A 404 on a write is unexpected and treated as transient.
    pub fn from_status(record: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        match FailureClass::from_status(status) {
            FailureClass::Permanent => WriteError::Permanent {
                record: record.into(),
                status: Some(status),
                reason: reason.into(),
            },
            FailureClass::Transient | FailureClass::NotFound => WriteError::Transient {
                record: record.into(),
                status: Some(status),
                reason: reason.into(),
            },
        }
    }

    /// A transport-level failure with no HTTP status (connection refused, timeout).
    pub fn network(record: impl Into<String>, reason: impl Into<String>) -> Self {
        WriteError::Transient {
            record: record.into(),
            status: None,
            reason: reason.into(),
        }
    }

    /// A write rejected before it reached the network.
    pub fn rejected(record: impl Into<String>, status: Option<u16>, reason: impl Into<String>) -> Self {
        WriteError::Permanent {
            record: record.into(),
            status,
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteError::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            WriteError::Transient { status, .. } | WriteError::Permanent { status, .. } => *status,
        }
    }

    pub fn record(&self) -> &str {
        match self {
            WriteError::Transient { record, .. } | WriteError::Permanent { record, .. } => record,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

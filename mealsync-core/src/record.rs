//! Record addressing.
//!
//! A record lives under an `(owner, key)` pair. The same pair is rendered
//! three ways depending on the layer:
//!
//! | Layer          | Format                       |
//! |----------------|------------------------------|
//! | memory cache   | `{owner}:{key}`              |
//! | durable mirror | `{owner}_{key}`              |
//! | blob store     | `users/{owner}/{key}.json`   |
//!
//! Identifiers are validated at construction so every rendering is well
//! formed: no path separators, no `..`, no `:`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RecordError;

/// Maximum length in bytes of an owner id or record key.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Prefix shared by every blob path.
pub const BLOB_ROOT: &str = "users";

/// Opaque JSON payload stored under a record.
///
/// `serde_json::Value` is already the null | bool | number | string |
/// array | object tagged union, so it is used directly at the store boundary.
pub type RecordValue = serde_json::Value;

fn validate_identifier(field: &'static str, raw: &str) -> Result<(), RecordError> {
    if raw.is_empty() {
        return Err(RecordError::Empty { field });
    }
    if raw.len() > MAX_IDENTIFIER_LEN {
        return Err(RecordError::TooLong {
            field,
            len: raw.len(),
            max: MAX_IDENTIFIER_LEN,
        });
    }
    if let Some(ch) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(RecordError::InvalidCharacter { field, ch });
    }
    if raw.starts_with('.') {
        return Err(RecordError::Malformed {
            field,
            reason: "must not start with '.'".to_string(),
        });
    }
    if raw.contains("..") {
        return Err(RecordError::Malformed {
            field,
            reason: "must not contain '..'".to_string(),
        });
    }
    Ok(())
}

/// Identifier of the user owning a set of records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(pub(crate) String);

impl OwnerId {
    pub fn new(raw: impl Into<String>) -> Result<Self, RecordError> {
        let raw = raw.into();
        validate_identifier("owner_id", &raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a record within an owner's namespace (e.g. `profile`, `pantry`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey(pub(crate) String);

impl RecordKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, RecordError> {
        let raw = raw.into();
        validate_identifier("key", &raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RecordKey {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordKey> for String {
    fn from(value: RecordKey) -> Self {
        value.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully qualified reference to one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    owner: OwnerId,
    key: RecordKey,
}

impl RecordRef {
    pub fn new(owner: OwnerId, key: RecordKey) -> Self {
        Self { owner, key }
    }

    /// Validate and build a reference from raw strings.
    pub fn parse(owner: &str, key: &str) -> Result<Self, RecordError> {
        Ok(Self::new(OwnerId::new(owner)?, RecordKey::new(key)?))
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// `{owner}:{key}`
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.owner, self.key)
    }

    /// `{owner}_{key}`
    pub fn mirror_key(&self) -> String {
        format!("{}_{}", self.owner, self.key)
    }

    /// `users/{owner}/{key}.json`
    pub fn blob_path(&self) -> String {
        format!("{}/{}/{}.json", BLOB_ROOT, self.owner, self.key)
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// `users/{owner}/`, the listing prefix for one owner's blobs.
pub fn owner_blob_prefix(owner: &OwnerId) -> String {
    format!("{}/{}/", BLOB_ROOT, owner)
}

/// Parse a blob path back into a record reference.
///
/// Returns `None` for anything that is not exactly `users/{owner}/{key}.json`
/// with valid identifiers.
pub fn parse_blob_path(path: &str) -> Option<RecordRef> {
    let rest = path.strip_prefix(BLOB_ROOT)?.strip_prefix('/')?;
    let (owner, file) = rest.split_once('/')?;
    let key = file.strip_suffix(".json")?;
    RecordRef::parse(owner, key).ok()
}

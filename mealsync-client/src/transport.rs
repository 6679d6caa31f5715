//! Wire-level access to the KV proxy.
//!
//! The client speaks to the proxy only through [`KvTransport`], one request
//! and one response at a time. Requests are kept at the wire level (method,
//! path and query, JSON body) so that alternative transports and test
//! doubles see exactly what would go over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use mealsync_core::{OwnerId, RecordRef, RecordValue};
use serde_json::json;

/// Path of the KV proxy endpoint.
pub const KV_PATH: &str = "/api/kv";

/// Path of the owner key listing endpoint.
pub const KV_KEYS_PATH: &str = "/api/kv/keys";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The proxy could not be reached at all.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// A response arrived but not the one the call needed.
    #[error("Unexpected response (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvMethod {
    Get,
    Post,
    Delete,
}

impl KvMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            KvMethod::Get => "GET",
            KvMethod::Post => "POST",
            KvMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for KvMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the KV proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct KvRequest {
    pub method: KvMethod,
    /// e.g. `/api/kv?userId=u1&key=profile`
    pub path_and_query: String,
    pub body: Option<serde_json::Value>,
}

// Identifiers are restricted to `[A-Za-z0-9_.-]`, none of which need
// percent-encoding in a query string.
fn record_query(record: &RecordRef) -> String {
    format!("{}?userId={}&key={}", KV_PATH, record.owner(), record.key())
}

impl KvRequest {
    pub fn get(record: &RecordRef) -> Self {
        Self {
            method: KvMethod::Get,
            path_and_query: record_query(record),
            body: None,
        }
    }

    /// Write request carrying `{"value": value}`.
    pub fn post(record: &RecordRef, value: &RecordValue) -> Self {
        Self {
            method: KvMethod::Post,
            path_and_query: record_query(record),
            body: Some(json!({ "value": value })),
        }
    }

    pub fn delete(record: &RecordRef) -> Self {
        Self {
            method: KvMethod::Delete,
            path_and_query: record_query(record),
            body: None,
        }
    }

    pub fn list_keys(owner: &OwnerId) -> Self {
        Self {
            method: KvMethod::Get,
            path_and_query: format!("{}?userId={}", KV_KEYS_PATH, owner),
            body: None,
        }
    }

    /// Value of a query parameter, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.path_and_query.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map_or(self.path_and_query.as_str(), |(path, _)| path)
    }
}

/// One response from the KV proxy.
///
/// `body` is `None` when the response had no body or the body was not JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct KvResponse {
    pub status: u16,
    pub body: Option<serde_json::Value>,
}

impl KvResponse {
    pub fn new(status: u16, body: Option<serde_json::Value>) -> Self {
        Self { status, body }
    }

    /// `200 {"success":true}`
    pub fn ok() -> Self {
        Self::new(200, Some(json!({ "success": true })))
    }

    /// `200 {"success":true,"value":value}`
    pub fn ok_value(value: RecordValue) -> Self {
        Self::new(200, Some(json!({ "success": true, "value": value })))
    }

    /// Error response in the proxy's `{"error": ...}` shape.
    pub fn error(status: u16, message: &str) -> Self {
        Self::new(status, Some(json!({ "error": message })))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `value` field of a successful GET.
    ///
    /// `Some(Value::Null)` means a stored `null`; `None` means the field was
    /// missing altogether.
    pub fn value(&self) -> Option<&RecordValue> {
        self.body.as_ref()?.get("value")
    }

    /// Human-readable reason from an error body, `error` plus `details`.
    pub fn error_message(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        let error = body.get("error")?.as_str()?;
        match body.get("details").and_then(|d| d.as_str()) {
            Some(details) => Some(format!("{}: {}", error, details)),
            None => Some(error.to_string()),
        }
    }

    /// The error message, or a generic one naming the status.
    pub fn describe(&self) -> String {
        self.error_message()
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// Sends requests to the KV proxy.
#[async_trait]
pub trait KvTransport: Send + Sync + 'static {
    /// Send one request.
    ///
    /// Any HTTP status is a successful `Ok`; `Err` means no response was
    /// received.
    async fn send(&self, request: KvRequest) -> Result<KvResponse, TransportError>;
}

#[async_trait]
impl<T: KvTransport + ?Sized> KvTransport for Arc<T> {
    async fn send(&self, request: KvRequest) -> Result<KvResponse, TransportError> {
        (**self).send(request).await
    }
}

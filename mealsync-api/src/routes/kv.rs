//! KV Proxy Routes
//!
//! One JSON blob per `(userId, key)`, stored at `users/{userId}/{key}.json`:
//! - GET    /api/kv?userId=&key=  - Read a value
//! - POST   /api/kv?userId=&key=  - Store `{"value": ...}`
//! - DELETE /api/kv?userId=&key=  - Remove a value (idempotent)
//! - GET    /api/kv/keys?userId=  - List an owner's keys
//!
//! Any other method gets a JSON 405.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use mealsync_core::{owner_blob_prefix, parse_blob_path, OwnerId, RecordRef, RecordValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const KV_PATH: &str = "/api/kv";
pub const KV_KEYS_PATH: &str = "/api/kv/keys";

// ============================================================================
// TYPES
// ============================================================================

/// Query string of every KV route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KvParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub key: Option<String>,
}

impl KvParams {
    fn owner(&self) -> ApiResult<OwnerId> {
        let raw = self
            .user_id
            .as_deref()
            .ok_or_else(|| ApiError::missing_field("userId"))?;
        Ok(OwnerId::new(raw)?)
    }

    fn record(&self) -> ApiResult<RecordRef> {
        let owner = self
            .user_id
            .as_deref()
            .ok_or_else(|| ApiError::missing_field("userId"))?;
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| ApiError::missing_field("key"))?;
        Ok(RecordRef::parse(owner, key)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueResponse {
    pub success: bool,
    pub value: RecordValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysResponse {
    pub success: bool,
    pub keys: Vec<String>,
}

fn parse_params(query: Result<Query<KvParams>, QueryRejection>) -> ApiResult<KvParams> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| {
            ApiError::invalid_input("Invalid query string").with_details(rejection.body_text())
        })
}

/// Pull the `value` field out of a POST body.
///
/// `{"value": null}` is a value; `{}` is not.
fn parse_value(body: &[u8]) -> ApiResult<RecordValue> {
    let envelope: RecordValue = serde_json::from_slice(body)?;
    match envelope {
        RecordValue::Object(mut fields) => fields
            .remove("value")
            .ok_or_else(|| ApiError::missing_field("value")),
        _ => Err(ApiError::invalid_input("Body must be a JSON object")),
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/kv - Read one value
pub async fn get_value(
    State(state): State<AppState>,
    query: Result<Query<KvParams>, QueryRejection>,
) -> ApiResult<Json<ValueResponse>> {
    let record = parse_params(query)?.record()?;

    let body = state
        .store
        .get(&record.blob_path())
        .await?
        .ok_or_else(ApiError::key_not_found)?;

    let value = serde_json::from_slice(&body).map_err(|e| {
        error!(owner = %record.owner(), key = %record.key(), error = %e, "Stored blob is not valid JSON");
        ApiError::internal_error("Stored value is unreadable")
    })?;

    debug!(owner = %record.owner(), key = %record.key(), "Value read");
    Ok(Json(ValueResponse {
        success: true,
        value,
    }))
}

/// POST /api/kv - Store one value
pub async fn put_value(
    State(state): State<AppState>,
    query: Result<Query<KvParams>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let record = parse_params(query)?.record()?;
    let limit = state.config.max_payload_bytes;

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(limit)
        } else {
            ApiError::invalid_input("Failed to read request body")
                .with_details(rejection.body_text())
        }
    })?;

    let value = parse_value(&body)?;
    let encoded = serde_json::to_vec(&value)
        .map_err(|e| ApiError::internal_error(format!("Failed to encode value: {}", e)))?;
    if encoded.len() > limit {
        return Err(ApiError::payload_too_large(limit));
    }

    let meta = state.store.put(&record.blob_path(), encoded).await?;
    info!(
        owner = %record.owner(),
        key = %record.key(),
        size = meta.size,
        "Value stored"
    );
    Ok(Json(SuccessResponse { success: true }))
}

/// DELETE /api/kv - Remove one value, present or not
pub async fn delete_value(
    State(state): State<AppState>,
    query: Result<Query<KvParams>, QueryRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let record = parse_params(query)?.record()?;
    let existed = state.store.delete(&record.blob_path()).await?;
    debug!(owner = %record.owner(), key = %record.key(), existed, "Value deleted");
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/kv/keys - List an owner's keys
pub async fn list_keys(
    State(state): State<AppState>,
    query: Result<Query<KvParams>, QueryRejection>,
) -> ApiResult<Json<KeysResponse>> {
    let owner = parse_params(query)?.owner()?;
    let blobs = state.store.list(&owner_blob_prefix(&owner)).await?;

    let keys = blobs
        .iter()
        .filter_map(|meta| parse_blob_path(&meta.path))
        .filter(|record| record.owner() == &owner)
        .map(|record| record.key().to_string())
        .collect();

    Ok(Json(KeysResponse {
        success: true,
        keys,
    }))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            KV_PATH,
            get(get_value)
                .post(put_value)
                .delete(delete_value)
                .fallback(method_not_allowed),
        )
        .route(KV_KEYS_PATH, get(list_keys).fallback(method_not_allowed))
}

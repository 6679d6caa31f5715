//! HTTP routes of the KV proxy.

pub mod health;
pub mod kv;

pub use kv::{KeysResponse, KvParams, SuccessResponse, ValueResponse, KV_KEYS_PATH, KV_PATH};

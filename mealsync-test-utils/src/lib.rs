//! MealSync Test Utilities
//!
//! Shared test infrastructure for the MealSync workspace:
//! - `RecordingTransport`: an in-memory KV proxy that records every request
//! - Proptest generators for identifiers and JSON values
//! - Fixtures for typed records and clients
//! - Assertions on write results

pub use mealsync_client::{
    Ack, FlushReport, KvMethod, KvRequest, KvResponse, KvTransport, SyncEvent, SyncKvClient,
    TransportError,
};
pub use mealsync_core::{
    MealPlan, OwnerId, Pantry, PantryItem, Profile, RecordKey, RecordRef, RecordValue,
    ShoppingList, SyncConfig, WriteError,
};
pub use mealsync_storage::{Freshness, MemoryMirror};

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// RECORDING TRANSPORT
// ============================================================================

/// In-memory stand-in for the KV proxy.
///
/// Answers requests the way the real endpoint does (GET/POST/DELETE on
/// `/api/kv`, owner listing on `/api/kv/keys`) against a map, and records
/// every request it receives. One-shot responses can be scripted per
/// method, the whole remote can be taken offline, and a latency can be
/// added to every call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<KvRequest>>,
    remote: Mutex<BTreeMap<(String, String), RecordValue>>,
    scripted: Mutex<VecDeque<(KvMethod, KvResponse)>>,
    offline: AtomicBool,
    latency: Mutex<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Put a value straight into the simulated remote store.
    pub fn seed(&self, owner: &str, key: &str, value: RecordValue) {
        self.remote
            .lock()
            .unwrap()
            .insert((owner.to_string(), key.to_string()), value);
    }

    pub fn remote_value(&self, owner: &str, key: &str) -> Option<RecordValue> {
        self.remote
            .lock()
            .unwrap()
            .get(&(owner.to_string(), key.to_string()))
            .cloned()
    }

    /// Answer the next request with `method` with `response`.
    pub fn script(&self, method: KvMethod, response: KvResponse) {
        self.scripted.lock().unwrap().push_back((method, response));
    }

    /// Fail every request until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn requests(&self) -> Vec<KvRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, method: KvMethod) -> Vec<KvRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    pub fn count(&self, method: KvMethod) -> usize {
        self.requests_for(method).len()
    }

    /// Values POSTed for one record, in order.
    pub fn posted_values(&self, owner: &str, key: &str) -> Vec<RecordValue> {
        self.requests_for(KvMethod::Post)
            .into_iter()
            .filter(|r| r.query_param("userId") == Some(owner) && r.query_param("key") == Some(key))
            .filter_map(|r| r.body.and_then(|b| b.get("value").cloned()))
            .collect()
    }

    fn take_scripted(&self, method: KvMethod) -> Option<KvResponse> {
        let mut scripted = self.scripted.lock().unwrap();
        let index = scripted.iter().position(|(m, _)| *m == method)?;
        scripted.remove(index).map(|(_, response)| response)
    }

    fn answer(&self, request: &KvRequest) -> KvResponse {
        let owner = request.query_param("userId").map(str::to_string);
        let key = request.query_param("key").map(str::to_string);
        let mut remote = self.remote.lock().unwrap();

        if request.path() == "/api/kv/keys" {
            let Some(owner) = owner else {
                return KvResponse::error(400, "Missing userId");
            };
            let keys: Vec<&String> = remote
                .keys()
                .filter(|(o, _)| *o == owner)
                .map(|(_, k)| k)
                .collect();
            return KvResponse::new(200, Some(json!({ "success": true, "keys": keys })));
        }

        let (Some(owner), Some(key)) = (owner, key) else {
            return KvResponse::error(400, "Missing userId or key");
        };
        match request.method {
            KvMethod::Get => match remote.get(&(owner, key)) {
                Some(value) => KvResponse::ok_value(value.clone()),
                None => KvResponse::error(404, "Key not found"),
            },
            KvMethod::Post => match request.body.as_ref().and_then(|b| b.get("value")) {
                Some(value) => {
                    remote.insert((owner, key), value.clone());
                    KvResponse::ok()
                }
                None => KvResponse::error(400, "Missing value"),
            },
            KvMethod::Delete => {
                remote.remove(&(owner, key));
                KvResponse::ok()
            }
        }
    }
}

#[async_trait]
impl KvTransport for RecordingTransport {
    async fn send(&self, request: KvRequest) -> Result<KvResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("remote offline".to_string()));
        }
        Ok(self
            .take_scripted(request.method)
            .unwrap_or_else(|| self.answer(&request)))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for MealSync identifiers and values.

    use super::*;
    use proptest::prelude::*;

    /// Valid identifier: alphanumeric start, then `[A-Za-z0-9_-]`.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9][a-zA-Z0-9_-]{0,31}"
    }

    pub fn arb_owner_id() -> impl Strategy<Value = OwnerId> {
        arb_identifier().prop_map(|s| OwnerId::new(s).expect("generator yields valid ids"))
    }

    pub fn arb_record_key() -> impl Strategy<Value = RecordKey> {
        arb_identifier().prop_map(|s| RecordKey::new(s).expect("generator yields valid keys"))
    }

    pub fn arb_record_ref() -> impl Strategy<Value = RecordRef> {
        (arb_owner_id(), arb_record_key()).prop_map(|(owner, key)| RecordRef::new(owner, key))
    }

    /// Strings that must never be accepted as an owner id or key.
    pub fn arb_invalid_identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[a-z]{0,4}/[a-z]{1,4}",
            "[a-z]{0,4}\\.\\.[a-z]{0,4}",
            "\\.[a-z]{1,8}",
            "[a-z]{1,4}[ :?&#%][a-z]{1,4}",
            "[a-z]{129,140}",
        ]
    }

    /// Arbitrary JSON value without floats (which do not compare exactly
    /// after a round trip).
    pub fn arb_record_value() -> impl Strategy<Value = RecordValue> {
        let leaf = prop_oneof![
            Just(RecordValue::Null),
            any::<bool>().prop_map(RecordValue::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,16}".prop_map(RecordValue::String),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(RecordValue::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| RecordValue::Object(m.into_iter().collect())),
            ]
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and clients for common scenarios.

    use super::*;
    use chrono::NaiveDate;

    pub type TestClient = SyncKvClient<Arc<RecordingTransport>, MemoryMirror>;

    /// Client with default timings over `transport` and an in-memory mirror.
    pub fn client(transport: &Arc<RecordingTransport>) -> TestClient {
        client_with_config(transport, SyncConfig::default())
    }

    pub fn client_with_config(transport: &Arc<RecordingTransport>, config: SyncConfig) -> TestClient {
        SyncKvClient::new(Arc::clone(transport), MemoryMirror::new(), config)
            .expect("test config is valid")
    }

    pub fn profile() -> Profile {
        Profile {
            display_name: "Sam".to_string(),
            household_size: 3,
            dietary_restrictions: vec!["vegetarian".to_string()],
            allergies: vec!["peanuts".to_string()],
            daily_calorie_target: Some(2200),
        }
    }

    pub fn pantry() -> Pantry {
        Pantry(vec![
            PantryItem {
                name: "rice".to_string(),
                quantity: 2.0,
                unit: Some("kg".to_string()),
                expires_on: None,
                barcode: None,
            },
            PantryItem {
                name: "milk".to_string(),
                quantity: 1.0,
                unit: Some("l".to_string()),
                expires_on: NaiveDate::from_ymd_opt(2026, 10, 25),
                barcode: Some("4006381333931".to_string()),
            },
        ])
    }

    /// A serialized value of roughly `bytes` bytes.
    pub fn payload_of_size(bytes: usize) -> RecordValue {
        json!({ "blob": "x".repeat(bytes) })
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on write outcomes.

    use super::*;

    #[track_caller]
    pub fn assert_queued(result: &Result<Ack, WriteError>) {
        match result {
            Ok(Ack::Queued { .. }) => {}
            other => panic!("Expected queued write, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_confirmed(result: &Result<Ack, WriteError>) {
        match result {
            Ok(Ack::Confirmed { .. }) => {}
            other => panic!("Expected confirmed write, got: {:?}", other),
        }
    }

    /// Assert a permanent failure, optionally with a specific status.
    #[track_caller]
    pub fn assert_permanent(result: &Result<Ack, WriteError>, status: Option<u16>) {
        match result {
            Err(err @ WriteError::Permanent { .. }) => {
                if status.is_some() {
                    assert_eq!(err.status(), status, "unexpected status in {:?}", err);
                }
            }
            other => panic!("Expected permanent write failure, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_transient(result: &Result<Ack, WriteError>) {
        match result {
            Err(WriteError::Transient { .. }) => {}
            other => panic!("Expected transient write failure, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_recording_transport_behaves_like_proxy() {
        let transport = RecordingTransport::new();
        let record = RecordRef::parse("u1", "profile").unwrap();

        let missing = transport.send(KvRequest::get(&record)).await.unwrap();
        assert_eq!(missing.status, 404);

        transport
            .send(KvRequest::post(&record, &json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(transport.remote_value("u1", "profile"), Some(json!({"a": 1})));

        let listing = transport
            .send(KvRequest::list_keys(record.owner()))
            .await
            .unwrap();
        assert_eq!(listing.body.unwrap()["keys"], json!(["profile"]));

        transport.send(KvRequest::delete(&record)).await.unwrap();
        assert_eq!(transport.remote_value("u1", "profile"), None);
        assert_eq!(transport.requests().len(), 4);
        assert_eq!(transport.posted_values("u1", "profile"), vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn test_scripted_responses_are_per_method() {
        let transport = RecordingTransport::new();
        let record = RecordRef::parse("u1", "profile").unwrap();
        transport.script(KvMethod::Post, KvResponse::error(413, "Payload too large"));

        let get = transport.send(KvRequest::get(&record)).await.unwrap();
        assert_eq!(get.status, 404);
        let post = transport
            .send(KvRequest::post(&record, &json!(1)))
            .await
            .unwrap();
        assert_eq!(post.status, 413);

        transport.set_offline(true);
        assert!(transport.send(KvRequest::get(&record)).await.is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_identifiers_are_valid(record in generators::arb_record_ref()) {
            prop_assert!(RecordRef::parse(record.owner().as_str(), record.key().as_str()).is_ok());
        }

        #[test]
        fn prop_invalid_identifiers_are_rejected(raw in generators::arb_invalid_identifier()) {
            prop_assert!(RecordKey::new(raw.clone()).is_err());
            prop_assert!(OwnerId::new(raw).is_err());
        }
    }
}

//! The synchronized client against a real proxy on a loopback socket.

use std::sync::Arc;
use std::time::Duration;

use mealsync_api::{create_router, ApiConfig, AppState};
use mealsync_client::{Freshness, HttpTransport, SyncEvent, SyncKvClient};
use mealsync_core::SyncConfig;
use mealsync_storage::{BlobStore, LmdbBlobStore, MemoryBlobStore, MemoryMirror};
use mealsync_test_utils::assertions::{assert_confirmed, assert_permanent, assert_queued};
use mealsync_test_utils::fixtures::payload_of_size;
use serde_json::json;

type E2eClient = SyncKvClient<HttpTransport, MemoryMirror>;

async fn spawn_server(store: Arc<dyn BlobStore>, config: ApiConfig) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(AppState::new(store, config));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_with_debounce(base_url: &str, debounce: Duration) -> E2eClient {
    let transport = HttpTransport::new(base_url, Some(Duration::from_secs(5))).unwrap();
    let config = SyncConfig::default().with_debounce_window(debounce);
    SyncKvClient::new(transport, MemoryMirror::new(), config).unwrap()
}

/// Timers stay out of the way; tests flush explicitly.
fn client_for(base_url: &str) -> E2eClient {
    client_with_debounce(base_url, Duration::from_secs(60))
}

#[tokio::test]
async fn test_queued_write_reaches_the_server() {
    let store = Arc::new(MemoryBlobStore::new());
    let base_url = spawn_server(store.clone(), ApiConfig::default()).await;
    let client = client_for(&base_url);

    assert_queued(&client.set("u1", "profile", json!({"a": 1})).await);
    let report = client.flush_pending_writes().await;
    assert_eq!(report.confirmed, 1);
    assert!(report.is_clean());

    let stored = store.get("users/u1/profile.json").await.unwrap().unwrap();
    assert_eq!(serde_json::from_slice::<serde_json::Value>(&stored).unwrap(), json!({"a": 1}));

    // A second client with an empty cache sees the server copy.
    let other = client_for(&base_url);
    assert_eq!(
        other.get("u1", "profile", Freshness::Remote).await,
        Some(json!({"a": 1}))
    );
}

#[tokio::test]
async fn test_debounce_timer_flushes_on_its_own() {
    let store = Arc::new(MemoryBlobStore::new());
    let base_url = spawn_server(store.clone(), ApiConfig::default()).await;
    let client = client_with_debounce(&base_url, Duration::from_millis(20));
    let mut events = client.subscribe();

    client.set("u1", "mealPlan", json!({"days": []})).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, SyncEvent::WriteConfirmed { .. }));
    assert!(!client.has_pending("u1", "mealPlan"));
    assert!(store.get("users/u1/mealPlan.json").await.unwrap().is_some());
}

#[tokio::test]
async fn test_critical_write_is_confirmed() {
    let store = Arc::new(MemoryBlobStore::new());
    let base_url = spawn_server(store.clone(), ApiConfig::default()).await;
    let client = client_for(&base_url);

    let ack = client.set("u1", "pantry", json!([{"name": "rice"}])).await;
    assert_confirmed(&ack);
    assert!(store.get("users/u1/pantry.json").await.unwrap().is_some());
}

#[tokio::test]
async fn test_missing_key_and_null_value() {
    let base_url = spawn_server(Arc::new(MemoryBlobStore::new()), ApiConfig::default()).await;
    let client = client_for(&base_url);

    assert_eq!(client.get("u1", "missing", Freshness::Remote).await, None);

    assert_confirmed(&client.set("u1", "pantry", serde_json::Value::Null).await);
    let other = client_for(&base_url);
    assert_eq!(
        other.get("u1", "pantry", Freshness::Remote).await,
        Some(serde_json::Value::Null)
    );
}

#[tokio::test]
async fn test_server_payload_limit_drops_the_write() {
    let config = ApiConfig {
        max_payload_bytes: 1024,
        ..ApiConfig::default()
    };
    let store = Arc::new(MemoryBlobStore::new());
    let base_url = spawn_server(store.clone(), config).await;
    let client = client_for(&base_url);

    assert_queued(&client.set("u1", "profile", payload_of_size(4096)).await);
    let report = client.flush_pending_writes().await;
    assert_eq!(report.dropped, 1);
    assert_eq!(client.pending_count(), 0);

    let result = client.set("u1", "pantry", payload_of_size(4096)).await;
    assert_permanent(&result, Some(413));
    assert!(store.list("users/u1/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_quota_exhaustion_is_permanent() {
    let store = Arc::new(MemoryBlobStore::with_quota(256));
    let base_url = spawn_server(store, ApiConfig::default()).await;
    let client = client_for(&base_url);

    let result = client.set("u1", "pantry", payload_of_size(512)).await;
    assert_permanent(&result, Some(507));

    client.set("u1", "profile", payload_of_size(512)).await.unwrap();
    let report = client.flush_pending_writes().await;
    assert_eq!(report.dropped, 1);
    assert!(!client.has_pending("u1", "profile"));
}

#[tokio::test]
async fn test_delete_and_list_keys() {
    let base_url = spawn_server(Arc::new(MemoryBlobStore::new()), ApiConfig::default()).await;
    let client = client_for(&base_url);

    client.set("u1", "pantry", json!([])).await.unwrap();
    client.set("u1", "profile", json!({})).await.unwrap();
    client.flush_pending_writes().await;

    let other = client_for(&base_url);
    let keys: Vec<String> = other
        .list_keys("u1")
        .await
        .into_iter()
        .map(|k| k.to_string())
        .collect();
    assert_eq!(keys, vec!["pantry", "profile"]);

    assert!(client.delete("u1", "profile").await);
    assert!(client.delete("u1", "never-existed").await);
    assert_eq!(other.get("u1", "profile", Freshness::Remote).await, None);
}

#[tokio::test]
async fn test_lmdb_backed_server() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LmdbBlobStore::open(dir.path(), 16, Some(4096)).unwrap());
    let base_url = spawn_server(store.clone(), ApiConfig::default()).await;
    let client = client_for(&base_url);

    assert_confirmed(&client.set("u1", "pantry", json!(["oats"])).await);
    assert!(store.used_bytes() > 0);

    let other = client_for(&base_url);
    assert_eq!(
        other.get("u1", "pantry", Freshness::Remote).await,
        Some(json!(["oats"]))
    );

    let result = client.set("u1", "pantry", payload_of_size(8192)).await;
    assert_permanent(&result, Some(507));
}

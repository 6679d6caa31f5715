use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{check_path, check_quota, BlobError, BlobMeta, BlobStore};

#[derive(Debug, Clone)]
struct StoredBlob {
    body: Vec<u8>,
    meta: BlobMeta,
}

/// Blob store held in a process-local map.
///
/// Fallback for a proxy started without a persistent store; everything is
/// lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
    quota_bytes: Option<u64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub async fn used_bytes(&self) -> u64 {
        self.blobs.read().await.values().map(|b| b.meta.size).sum()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        check_path(path)?;
        Ok(self.blobs.read().await.get(path).map(|b| b.body.clone()))
    }

    async fn put(&self, path: &str, body: Vec<u8>) -> Result<BlobMeta, BlobError> {
        check_path(path)?;
        let mut blobs = self.blobs.write().await;

        let used: u64 = blobs.values().map(|b| b.meta.size).sum();
        let replaced = blobs.get(path).map(|b| b.meta.size).unwrap_or(0);
        check_quota(self.quota_bytes, used, replaced, body.len() as u64)?;

        let meta = BlobMeta {
            path: path.to_string(),
            size: body.len() as u64,
            uploaded_at: Utc::now(),
        };
        blobs.insert(
            path.to_string(),
            StoredBlob {
                body,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn delete(&self, path: &str) -> Result<bool, BlobError> {
        check_path(path)?;
        Ok(self.blobs.write().await.remove(path).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(_, blob)| blob.meta.clone())
            .collect())
    }

    async fn health_check(&self) -> Result<(), BlobError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryBlobStore::new();
        let path = "users/u1/profile.json";

        assert_eq!(store.get(path).await.unwrap(), None);
        let meta = store.put(path, b"{\"a\":1}".to_vec()).await.unwrap();
        assert_eq!(meta.size, 7);
        assert_eq!(store.get(path).await.unwrap(), Some(b"{\"a\":1}".to_vec()));

        assert!(store.delete(path).await.unwrap());
        assert!(!store.delete(path).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryBlobStore::new();
        for path in [
            "users/u1/profile.json",
            "users/u1/pantry.json",
            "users/u10/profile.json",
            "users/u2/profile.json",
        ] {
            store.put(path, b"1".to_vec()).await.unwrap();
        }

        let listed: Vec<String> = store
            .list("users/u1/")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(listed, vec!["users/u1/pantry.json", "users/u1/profile.json"]);
    }

    #[tokio::test]
    async fn test_quota() {
        let store = MemoryBlobStore::with_quota(10);
        store.put("users/u1/a.json", vec![0; 8]).await.unwrap();

        let err = store.put("users/u1/b.json", vec![0; 3]).await.unwrap_err();
        assert_eq!(err, BlobError::QuotaExceeded { used: 8, limit: 10 });

        // Replacing the same blob with something that fits is fine.
        store.put("users/u1/a.json", vec![0; 10]).await.unwrap();
        assert_eq!(store.used_bytes().await, 10);
    }

    #[tokio::test]
    async fn test_rejects_bad_paths() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.put("users/../x.json", vec![]).await,
            Err(BlobError::InvalidPath(_))
        ));
    }
}

//! In-process [`BlobStore`] for development and tests.
//!
//! Writes can be made to fail for keys containing a configured substring,
//! which is how the rollback paths are exercised without a real backend.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{
    normalize_key, normalize_prefix, timestamped_key, BlobStore, StorageError, StorageResult,
};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    failing_writes: RwLock<Vec<String>>,
    base_url: String,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Make every subsequent write whose key contains `needle` fail.
    pub async fn fail_writes_containing(&self, needle: impl Into<String>) {
        self.failing_writes.write().await.push(needle.into());
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn put(&self, key: String, data: Vec<u8>) -> StorageResult<String> {
        let should_fail = self
            .failing_writes
            .read()
            .await
            .iter()
            .any(|needle| key.contains(needle.as_str()));
        if should_fail {
            return Err(StorageError::Backend(anyhow!("Injected write failure for {}", key)));
        }

        self.objects.write().await.insert(key.clone(), data);
        Ok(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, data: Vec<u8>, folder: &str, filename: &str) -> StorageResult<String> {
        let key = timestamped_key(folder, filename)?;
        self.put(key, data).await
    }

    async fn save_with_path(&self, data: Vec<u8>, path: &str) -> StorageResult<String> {
        let key = normalize_key(path)?;
        self.put(key, data).await
    }

    async fn retrieve(&self, path: &str) -> StorageResult<Vec<u8>> {
        let key = normalize_key(path)?;
        self.objects
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound(key))
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let key = normalize_key(path)?;
        self.objects.write().await.remove(&key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let prefix = normalize_prefix(prefix)?;
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(&prefix));
        Ok(before - objects.len())
    }

    async fn delete_batch(&self, paths: &[String]) -> StorageResult<()> {
        let keys = paths
            .iter()
            .map(|p| normalize_key(p))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut objects = self.objects.write().await;
        for key in keys {
            objects.remove(&key);
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

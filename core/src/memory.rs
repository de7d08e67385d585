use crate::store::{ObjectInfo, RemoteStore, StoreType};
use crate::{ContentDigest, Error, ObjectKey, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory store, used for dry runs and tests.
///
/// Objects live behind a `RwLock`; `put_count` counts every successful
/// `put_file`, including repeated puts to an existing key.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ObjectKey, Bytes>>,
    puts: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places an object directly, bypassing `put_file`.
    pub fn insert(&self, key: ObjectKey, data: impl Into<Bytes>) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key, data.into());
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Bytes> {
        self.objects.read().expect("lock poisoned").get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<_> = self
            .objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>> {
        Ok(self.get(key).map(|data| ObjectInfo {
            key: key.clone(),
            size: Some(data.len() as u64),
            modified: None,
        }))
    }

    async fn checksum(&self, key: &ObjectKey) -> Result<Option<ContentDigest>> {
        Ok(self.get(key).map(|data| ContentDigest::from_data(&data)))
    }

    async fn put_file(&self, key: &ObjectKey, path: &Path, _digest: &ContentDigest) -> Result<()> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path.display(), e)))?;
        self.insert(key.clone(), data);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn store_type(&self) -> StoreType {
        StoreType::Memory
    }
}

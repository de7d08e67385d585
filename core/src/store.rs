use crate::{ContentDigest, ObjectKey, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Memory,
    Local,
    S3,
}

/// What a store knows about an object without transferring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: ObjectKey,
    /// Byte length, when the store reported one. An unknown length never
    /// matches a local file.
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Remote blob service holding content-addressed objects.
///
/// Keys are derived from content, so an existing object is never replaced
/// with different bytes and concurrent puts to one key are idempotent.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Verifies the store is reachable before any file is processed.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// `Ok(None)` when no object exists at `key`. A present empty object is
    /// `Some` with size 0.
    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>>;

    /// SHA-256 of the stored object, if the store can report one.
    async fn checksum(&self, _key: &ObjectKey) -> Result<Option<ContentDigest>> {
        Ok(None)
    }

    /// Uploads the full content of `path` to `key`. `digest` is the hash the
    /// caller computed for that content; stores that support server-side
    /// integrity checks should reject a body that does not match it.
    async fn put_file(&self, key: &ObjectKey, path: &Path, digest: &ContentDigest) -> Result<()>;

    fn store_type(&self) -> StoreType;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<S> {
    async fn init(&self) -> Result<()> {
        (**self).init().await
    }

    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>> {
        (**self).stat(key).await
    }

    async fn checksum(&self, key: &ObjectKey) -> Result<Option<ContentDigest>> {
        (**self).checksum(key).await
    }

    async fn put_file(&self, key: &ObjectKey, path: &Path, digest: &ContentDigest) -> Result<()> {
        (**self).put_file(key, path, digest).await
    }

    fn store_type(&self) -> StoreType {
        (**self).store_type()
    }
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for Box<S> {
    async fn init(&self) -> Result<()> {
        (**self).init().await
    }

    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>> {
        (**self).stat(key).await
    }

    async fn checksum(&self, key: &ObjectKey) -> Result<Option<ContentDigest>> {
        (**self).checksum(key).await
    }

    async fn put_file(&self, key: &ObjectKey, path: &Path, digest: &ContentDigest) -> Result<()> {
        (**self).put_file(key, path, digest).await
    }

    fn store_type(&self) -> StoreType {
        (**self).store_type()
    }
}

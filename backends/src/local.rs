use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shardcas_core::store::{ObjectInfo, RemoteStore, StoreType};
use shardcas_core::{ContentDigest, Error, FileHasher, ObjectKey, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Stores objects as plain files below a directory, one file per key.
///
/// Uploads are copied to a temporary name in the target directory, verified
/// against the caller's digest and then renamed into place, so a reader never
/// sees a partially written object at its final key.
pub struct LocalBackend {
    base_path: PathBuf,
    hasher: FileHasher,
}

impl LocalBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            hasher: FileHasher::default(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, key: &ObjectKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Copies `source` to `temp_path`, checks it against `digest` and moves
    /// it to `full_path`. Leaves `temp_path` behind on error.
    async fn write_verified(
        &self,
        key: &ObjectKey,
        source: &Path,
        temp_path: &Path,
        full_path: &Path,
        digest: &ContentDigest,
    ) -> Result<()> {
        fs::copy(source, temp_path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to copy {}: {}", source.display(), e)))?;

        let written = self.hasher.hash_file(temp_path).await.map_err(|e| {
            Error::Backend(format!("Failed to verify copy of {}: {}", source.display(), e))
        })?;
        if &written != digest {
            return Err(Error::Backend(format!(
                "{} changed since it was hashed (expected {}, copied {})",
                source.display(),
                digest.short_string(),
                written.short_string()
            )));
        }

        fs::rename(temp_path, full_path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", key, e)))?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for LocalBackend {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await.map_err(|e| {
            Error::Backend(format!(
                "Store directory {} not accessible: {}",
                self.base_path.display(),
                e
            ))
        })?;
        Ok(())
    }

    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>> {
        let metadata = match fs::metadata(self.full_path(key)).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Backend(format!("Failed to stat {}: {}", key, e))),
        };

        if !metadata.is_file() {
            return Err(Error::Backend(format!("{} is not a regular file", key)));
        }

        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        Ok(Some(ObjectInfo {
            key: key.clone(),
            size: Some(metadata.len()),
            modified,
        }))
    }

    async fn checksum(&self, key: &ObjectKey) -> Result<Option<ContentDigest>> {
        match self.hasher.hash_file(self.full_path(key)).await {
            Ok(digest) => Ok(Some(digest)),
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Backend(format!("Failed to checksum {}: {}", key, e))),
        }
    }

    async fn put_file(&self, key: &ObjectKey, path: &Path, digest: &ContentDigest) -> Result<()> {
        let full_path = self.full_path(key);
        let parent = full_path
            .parent()
            .ok_or_else(|| Error::Backend(format!("Invalid key {}", key)))?;
        fs::create_dir_all(parent).await?;

        let temp_path = parent.join(format!(
            ".{}.{:016x}.tmp",
            digest.to_hex(),
            rand::random::<u64>()
        ));

        let result = self
            .write_verified(key, path, &temp_path, &full_path, digest)
            .await;
        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result?;
        debug!(key = %key, path = %full_path.display(), "Stored object");

        Ok(())
    }

    fn store_type(&self) -> StoreType {
        StoreType::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &TempDir, data: &[u8]) -> (PathBuf, ContentDigest, ObjectKey) {
        let path = dir.path().join("source");
        std::fs::write(&path, data).unwrap();
        let digest = ContentDigest::from_data(data);
        let key = ObjectKey::from_digest(&digest);
        (path, digest, key)
    }

    #[tokio::test]
    async fn test_put_then_stat() {
        let work = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(store_dir.path());
        backend.init().await.unwrap();

        let (path, digest, key) = source(&work, b"hello");
        assert_eq!(backend.stat(&key).await.unwrap(), None);

        backend.put_file(&key, &path, &digest).await.unwrap();

        let info = backend.stat(&key).await.unwrap().unwrap();
        assert_eq!(info.size, Some(5));
        assert!(store_dir.path().join(key.as_str()).is_file());
        assert!(
            store_dir
                .path()
                .join("cas/2/c/2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
                .is_file()
        );
        assert_eq!(backend.checksum(&key).await.unwrap(), Some(digest));
    }

    #[tokio::test]
    async fn test_empty_object_exists_with_zero_size() {
        let work = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(store_dir.path());

        let (path, digest, key) = source(&work, b"");
        backend.put_file(&key, &path, &digest).await.unwrap();
        assert_eq!(backend.stat(&key).await.unwrap().unwrap().size, Some(0));
    }

    #[tokio::test]
    async fn test_content_changed_after_hashing_is_rejected() {
        let work = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(store_dir.path());

        let (path, digest, key) = source(&work, b"original");
        std::fs::write(&path, b"modified").unwrap();

        let result = backend.put_file(&key, &path, &digest).await;
        assert!(matches!(result, Err(Error::Backend(_))));
        assert_eq!(backend.stat(&key).await.unwrap(), None);

        let shard = store_dir.path().join(key.as_str());
        let leftovers: Vec<_> = std::fs::read_dir(shard.parent().unwrap())
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let work = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(store_dir.path());

        let (path, digest, key) = source(&work, b"blocked");
        // A non-empty directory at the final key makes the rename fail.
        let target = store_dir.path().join(key.as_str());
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        let result = backend.put_file(&key, &path, &digest).await;
        assert!(matches!(result, Err(Error::Backend(_))));

        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_is_error() {
        let work = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(store_dir.path());
        let digest = ContentDigest::from_data(b"x");
        let key = ObjectKey::from_digest(&digest);

        let result = backend
            .put_file(&key, &work.path().join("nope"), &digest)
            .await;
        assert!(result.is_err());
    }
}

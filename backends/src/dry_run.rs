use async_trait::async_trait;
use shardcas_core::store::{ObjectInfo, RemoteStore, StoreType};
use shardcas_core::{ContentDigest, Error, ObjectKey, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Read-only view of a store for dry runs.
///
/// Existence checks go to the wrapped store. Initialisation is skipped,
/// since it may create the store (a local directory, for instance), and every
/// upload is refused. The orchestrator stops before uploading when
/// `BackupOptions::dry_run` is set, so a refused put only shows up if the two
/// are used inconsistently.
pub struct DryRunStore<S> {
    inner: S,
}

impl<S: RemoteStore> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for DryRunStore<S> {
    async fn init(&self) -> Result<()> {
        debug!(store = ?self.inner.store_type(), "Dry run, store left untouched");
        Ok(())
    }

    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>> {
        self.inner.stat(key).await
    }

    async fn checksum(&self, key: &ObjectKey) -> Result<Option<ContentDigest>> {
        self.inner.checksum(key).await
    }

    async fn put_file(&self, key: &ObjectKey, path: &Path, _digest: &ContentDigest) -> Result<()> {
        warn!(path = %path.display(), key = %key, "Upload refused in dry run");
        Err(Error::Other(format!(
            "dry run: refusing to upload {} to {}",
            path.display(),
            key
        )))
    }

    fn store_type(&self) -> StoreType {
        self.inner.store_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalBackend;
    use shardcas_core::{BackupOptions, FileOutcome, FileToProcess, ManifestWriter, Orchestrator};
    use shardcas_core::{ManifestTiming, MemoryStore};
    use tempfile::TempDir;

    fn file(dir: &TempDir, name: &str, data: &[u8]) -> FileToProcess {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        FileToProcess {
            path,
            size: data.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_put_is_refused() {
        let dir = TempDir::new().unwrap();
        let source = file(&dir, "f", b"data");
        let digest = ContentDigest::from_data(b"data");
        let key = ObjectKey::from_digest(&digest);

        let store = DryRunStore::new(MemoryStore::new());
        assert!(store.put_file(&key, &source.path, &digest).await.is_err());

        assert_eq!(store.stat(&key).await.unwrap(), None);
        assert_eq!(store.inner().put_count(), 0);
    }

    #[tokio::test]
    async fn test_init_does_not_create_local_store() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("not-yet");

        let store = DryRunStore::new(LocalBackend::new(&root));
        store.init().await.unwrap();
        assert!(!root.exists());

        let key = ObjectKey::from_digest(&ContentDigest::from_data(b"x"));
        assert_eq!(store.stat(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dry_run_batch_reports_would_upload() {
        let dir = TempDir::new().unwrap();
        let new = file(&dir, "new", b"data");
        let present = file(&dir, "present", b"kept");

        let inner = MemoryStore::new();
        inner.insert(ObjectKey::from_digest(&ContentDigest::from_data(b"kept")), &b"kept"[..]);

        let options = BackupOptions {
            dry_run: true,
            manifest_timing: ManifestTiming::AfterOutcome,
            ..Default::default()
        };
        let manifest = ManifestWriter::new(Vec::new()).unwrap();
        let orchestrator = Orchestrator::new(DryRunStore::new(inner), manifest, options);

        let report = orchestrator.process_file(&new).await.unwrap();
        assert_eq!(report.outcome, FileOutcome::WouldUpload);

        let summary = orchestrator.run(&[new, present]).await.unwrap();
        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.uploaded_bytes, 0);
        assert_eq!(summary.would_upload, 1);
        assert_eq!(summary.would_upload_bytes, 4);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        // Only the file already in the store counts as backed up.
        assert_eq!(summary.manifest_entries, 1);

        let (store, _) = orchestrator.into_parts();
        assert_eq!(store.inner().put_count(), 0);
        assert_eq!(store.inner().len(), 1);
    }
}

//! Per-file backup pipeline: hash, derive key, record, check remote, upload.

use crate::hasher::{DEFAULT_BUFFER_SIZE, FileHasher};
use crate::manifest::{ManifestEntry, ManifestWriter};
use crate::progress::{NoProgress, ProgressSink, ProgressTracker};
use crate::store::RemoteStore;
use crate::{ContentDigest, Error, FileToProcess, ObjectKey, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// When a file's manifest row is written relative to its upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestTiming {
    /// Record every hashed file before the upload decision, whatever the
    /// outcome. The manifest is a log of intent.
    #[default]
    BeforeUpload,
    /// Record only files that ended up uploaded or already present.
    AfterOutcome,
}

/// How much evidence is required before an existing remote object is
/// accepted as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateCheck {
    /// Same key and same byte length. The key already encodes the digest,
    /// but nothing verifies the remote bytes themselves.
    #[default]
    SizeOnly,
    /// Same key, same length, and a store-reported SHA-256 equal to the local
    /// digest. Stores that cannot report a checksum never skip.
    Checksum,
}

impl FromStr for ManifestTiming {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "before-upload" => Ok(Self::BeforeUpload),
            "after-outcome" => Ok(Self::AfterOutcome),
            other => Err(Error::Config(format!(
                "unknown manifest timing {other:?} (expected before-upload or after-outcome)"
            ))),
        }
    }
}

impl FromStr for DuplicateCheck {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "size-only" => Ok(Self::SizeOnly),
            "checksum" => Ok(Self::Checksum),
            other => Err(Error::Config(format!(
                "unknown duplicate check {other:?} (expected size-only or checksum)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub hash_buffer_size: usize,
    pub manifest_timing: ManifestTiming,
    pub duplicate_check: DuplicateCheck,
    /// Upper bound for each stat, checksum or put call.
    pub remote_timeout: Option<Duration>,
    /// Files in flight at once. 1 processes strictly one file after another.
    pub jobs: usize,
    /// Stat the store as usual but stop before every upload.
    pub dry_run: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            hash_buffer_size: DEFAULT_BUFFER_SIZE,
            manifest_timing: ManifestTiming::default(),
            duplicate_check: DuplicateCheck::default(),
            remote_timeout: None,
            jobs: 1,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum FileOutcome {
    Uploaded,
    SkippedDuplicate,
    /// Dry run: the store lacks this content and nothing was sent.
    WouldUpload,
    Failed { error: String },
}

impl FileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }

    /// The content is known to be in the store after this run.
    pub fn is_stored(&self) -> bool {
        matches!(self, FileOutcome::Uploaded | FileOutcome::SkippedDuplicate)
    }
}

/// Result of running one file through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub size: u64,
    /// Missing when the file could not be hashed.
    pub digest: Option<ContentDigest>,
    pub key: Option<ObjectKey>,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub files: u64,
    pub bytes: u64,
    pub uploaded: u64,
    pub uploaded_bytes: u64,
    pub skipped: u64,
    pub skipped_bytes: u64,
    pub would_upload: u64,
    pub would_upload_bytes: u64,
    pub failed: u64,
    pub manifest_entries: u64,
    pub scan_errors: u64,
    pub failures: Vec<FailedFile>,
}

impl BatchSummary {
    fn add(&mut self, report: &FileReport) {
        self.files += 1;
        self.bytes += report.size;
        match &report.outcome {
            FileOutcome::Uploaded => {
                self.uploaded += 1;
                self.uploaded_bytes += report.size;
            }
            FileOutcome::SkippedDuplicate => {
                self.skipped += 1;
                self.skipped_bytes += report.size;
            }
            FileOutcome::WouldUpload => {
                self.would_upload += 1;
                self.would_upload_bytes += report.size;
            }
            FileOutcome::Failed { error } => {
                self.failed += 1;
                self.failures.push(FailedFile {
                    path: report.path.clone(),
                    error: error.clone(),
                });
            }
        }
    }

    /// True when every scanned file was uploaded or already present and no
    /// part of the tree was unreadable.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.scan_errors == 0
    }
}

/// Drives a batch of files through hash → key → manifest → stat → put.
///
/// A single file's failure never stops the batch. The only error returned
/// from [`Orchestrator::run`] is a failed manifest write, since a lost
/// manifest row defeats the audit trail.
pub struct Orchestrator<S, W: Write> {
    store: S,
    manifest: Mutex<ManifestWriter<W>>,
    hasher: FileHasher,
    options: BackupOptions,
    progress: Arc<dyn ProgressSink>,
}

impl<S, W> Orchestrator<S, W>
where
    S: RemoteStore,
    W: Write + Send,
{
    pub fn new(store: S, manifest: ManifestWriter<W>, options: BackupOptions) -> Self {
        Self {
            store,
            manifest: Mutex::new(manifest),
            hasher: FileHasher::new(options.hash_buffer_size),
            options,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, ManifestWriter<W>) {
        let manifest = match self.manifest.into_inner() {
            Ok(manifest) => manifest,
            Err(poisoned) => poisoned.into_inner(),
        };
        (self.store, manifest)
    }

    /// Processes `files` against a store the caller has already initialised.
    pub async fn run(&self, files: &[FileToProcess]) -> Result<BatchSummary> {
        let bytes_total: u64 = files.iter().map(|f| f.size).sum();
        info!(
            files = files.len(),
            bytes = bytes_total,
            jobs = self.options.jobs.max(1),
            "Processing files"
        );

        let mut tracker = ProgressTracker::new(files.len() as u64, bytes_total);
        let mut summary = BatchSummary::default();

        let mut reports = stream::iter(files)
            .map(|file| self.process_file(file))
            .buffer_unordered(self.options.jobs.max(1));

        while let Some(report) = reports.next().await {
            let report = report?;
            summary.add(&report);
            self.progress.file_finished(&report);

            if let Some(milestone) = tracker.advance(report.size) {
                info!(
                    files_done = milestone.files_done,
                    files_total = milestone.files_total,
                    "Processed {} of {} files ({}%)",
                    milestone.files_done,
                    milestone.files_total,
                    milestone.files_percent
                );
                info!(
                    bytes_done = milestone.bytes_done,
                    bytes_total = milestone.bytes_total,
                    "Processed {} of {} bytes ({}%)",
                    milestone.bytes_done,
                    milestone.bytes_total,
                    milestone.bytes_percent
                );
                self.progress.milestone(&milestone);
            }
        }

        summary.manifest_entries = self.manifest_entries()?;
        info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            would_upload = summary.would_upload,
            failed = summary.failed,
            "Batch finished"
        );

        Ok(summary)
    }

    /// Runs one file through the pipeline. Per-file problems are folded into
    /// the returned report; `Err` means the manifest could not be written.
    pub async fn process_file(&self, file: &FileToProcess) -> Result<FileReport> {
        self.progress.file_started(file);

        let digest = match self.hasher.hash_file(&file.path).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Failed to hash file");
                return Ok(FileReport {
                    path: file.path.clone(),
                    size: file.size,
                    digest: None,
                    key: None,
                    outcome: FileOutcome::Failed {
                        error: e.to_string(),
                    },
                });
            }
        };
        let key = ObjectKey::from_digest(&digest);
        debug!(path = %file.path.display(), digest = %digest, "Hashed file");

        if self.options.manifest_timing == ManifestTiming::BeforeUpload {
            self.record(file, digest)?;
        }

        let outcome = match self.transfer(file, &key, &digest).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = %file.path.display(), key = %key, error = %e, "Error uploading file");
                FileOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        if self.options.manifest_timing == ManifestTiming::AfterOutcome && outcome.is_stored() {
            self.record(file, digest)?;
        }

        Ok(FileReport {
            path: file.path.clone(),
            size: file.size,
            digest: Some(digest),
            key: Some(key),
            outcome,
        })
    }

    async fn transfer(
        &self,
        file: &FileToProcess,
        key: &ObjectKey,
        digest: &ContentDigest,
    ) -> Result<FileOutcome> {
        if let Some(remote) = self.bounded("stat", self.store.stat(key)).await? {
            if remote.size == Some(file.size) && self.remote_matches(key, digest).await? {
                info!(
                    path = %file.path.display(),
                    size = file.size,
                    key = %key,
                    "Skipping file already in store"
                );
                return Ok(FileOutcome::SkippedDuplicate);
            }
            debug!(
                key = %key,
                remote_size = ?remote.size,
                local_size = file.size,
                "Remote object does not match, uploading again"
            );
        }

        if self.options.dry_run {
            info!(
                path = %file.path.display(),
                size = file.size,
                key = %key,
                "Dry run, would upload"
            );
            return Ok(FileOutcome::WouldUpload);
        }

        info!(path = %file.path.display(), size = file.size, key = %key, "Uploading");
        self.bounded("put", self.store.put_file(key, &file.path, digest))
            .await?;
        info!(key = %key, "Upload succeeded");

        Ok(FileOutcome::Uploaded)
    }

    async fn remote_matches(&self, key: &ObjectKey, digest: &ContentDigest) -> Result<bool> {
        match self.options.duplicate_check {
            DuplicateCheck::SizeOnly => Ok(true),
            DuplicateCheck::Checksum => {
                let remote = self.bounded("checksum", self.store.checksum(key)).await?;
                Ok(remote.as_ref() == Some(digest))
            }
        }
    }

    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.options.remote_timeout {
            None => future.await,
            Some(after) => tokio::time::timeout(after, future)
                .await
                .map_err(|_| Error::Timeout {
                    operation: operation.to_string(),
                    after,
                })?,
        }
    }

    fn record(&self, file: &FileToProcess, sha256: ContentDigest) -> Result<()> {
        let entry = ManifestEntry {
            path: file.path.clone(),
            sha256,
        };
        self.manifest
            .lock()
            .map_err(|_| Error::Other("manifest lock poisoned".to_string()))?
            .record(&entry)
    }

    fn manifest_entries(&self) -> Result<u64> {
        Ok(self
            .manifest
            .lock()
            .map_err(|_| Error::Other("manifest lock poisoned".to_string()))?
            .entries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_names() {
        assert_eq!(
            "before-upload".parse::<ManifestTiming>().unwrap(),
            ManifestTiming::BeforeUpload
        );
        assert_eq!(
            "after-outcome".parse::<ManifestTiming>().unwrap(),
            ManifestTiming::AfterOutcome
        );
        assert_eq!(
            "size-only".parse::<DuplicateCheck>().unwrap(),
            DuplicateCheck::SizeOnly
        );
        assert_eq!(
            "checksum".parse::<DuplicateCheck>().unwrap(),
            DuplicateCheck::Checksum
        );
        assert!(matches!(
            "sometimes".parse::<ManifestTiming>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_defaults_match_sequential_size_only_behaviour() {
        let options = BackupOptions::default();
        assert_eq!(options.jobs, 1);
        assert_eq!(options.hash_buffer_size, 128 * 1024);
        assert_eq!(options.manifest_timing, ManifestTiming::BeforeUpload);
        assert_eq!(options.duplicate_check, DuplicateCheck::SizeOnly);
        assert!(options.remote_timeout.is_none());
        assert!(!options.dry_run);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = BatchSummary::default();
        let report = |outcome| FileReport {
            path: PathBuf::from("/f"),
            size: 10,
            digest: None,
            key: None,
            outcome,
        };
        summary.add(&report(FileOutcome::Uploaded));
        summary.add(&report(FileOutcome::SkippedDuplicate));
        summary.add(&report(FileOutcome::WouldUpload));
        summary.add(&report(FileOutcome::Failed {
            error: "boom".to_string(),
        }));

        assert_eq!(summary.files, 4);
        assert_eq!(summary.bytes, 40);
        assert_eq!(summary.uploaded_bytes, 10);
        assert_eq!(summary.skipped_bytes, 10);
        assert_eq!(summary.would_upload, 1);
        assert_eq!(summary.would_upload_bytes, 10);
        assert_eq!(summary.failures.len(), 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = FileReport {
            path: PathBuf::from("/f"),
            size: 1,
            digest: None,
            key: None,
            outcome: FileOutcome::SkippedDuplicate,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "skipped-duplicate");
        assert_eq!(json["size"], 1);
    }
}

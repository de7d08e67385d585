//! Directory traversal producing the ordered work list for a backup run.

use crate::{Error, FileToProcess};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Result of scanning one or more roots.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Regular files sorted by absolute path, without duplicates.
    pub files: Vec<FileToProcess>,

    /// Entries that could not be read. The subtree below each one is skipped.
    pub errors: Vec<Error>,
}

impl ScanReport {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Recursively enumerates regular files below a set of roots.
///
/// Symbolic links are never followed and never returned, and directories only
/// contribute their contents. Sizes come from a metadata call, not from
/// reading the file.
#[derive(Debug, Clone, Default)]
pub struct FileScanner {
    roots: Vec<PathBuf>,
}

impl FileScanner {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        for root in &self.roots {
            let root = match std::path::absolute(root) {
                Ok(root) => root,
                Err(e) => {
                    report.errors.push(scan_error(root, e.to_string()));
                    continue;
                }
            };
            scan_root(&root, &mut report);
        }

        report
            .files
            .sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
        report.files.dedup_by(|a, b| a.path == b.path);

        report
    }
}

fn scan_root(root: &Path, report: &mut ScanReport) {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                report.errors.push(scan_error(&path, e.to_string()));
                continue;
            }
        };

        // Symlinks report their own file type here since links are not followed.
        if !entry.file_type().is_file() {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                debug!(path = %entry.path().display(), size = metadata.len(), "Found file");
                report.files.push(FileToProcess {
                    path: entry.into_path(),
                    size: metadata.len(),
                });
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping file without metadata");
                report.errors.push(scan_error(entry.path(), e.to_string()));
            }
        }
    }
}

fn scan_error(path: &Path, message: String) -> Error {
    Error::Scan {
        path: path.display().to_string(),
        message,
    }
}

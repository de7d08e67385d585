use crate::{ContentDigest, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANIFEST_HEADER: [&str; 2] = ["path", "sha256"];

/// One manifest row: a local path and the digest it was mapped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub sha256: ContentDigest,
}

/// Append-only `path,sha256` table. Every row is flushed before `record`
/// returns so a reader tailing the file never misses a completed entry.
pub struct ManifestWriter<W: Write> {
    writer: csv::Writer<W>,
    entries: u64,
}

impl ManifestWriter<File> {
    /// Creates (or truncates) the manifest at `path` and writes the header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(file)
    }
}

impl<W: Write> ManifestWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        writer.write_record(MANIFEST_HEADER)?;
        writer.flush()?;
        Ok(Self { writer, entries: 0 })
    }

    pub fn record(&mut self, entry: &ManifestEntry) -> Result<()> {
        let digest = entry.sha256.to_hex();
        self.writer.write_record([
            entry.path.as_os_str().as_encoded_bytes(),
            digest.as_bytes(),
        ])?;
        self.writer.flush()?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, data: &[u8]) -> ManifestEntry {
        ManifestEntry {
            path: PathBuf::from(path),
            sha256: ContentDigest::from_data(data),
        }
    }

    #[test]
    fn test_header_written_on_create() {
        let writer = ManifestWriter::new(Vec::new()).unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"path,sha256\n");
        assert_eq!(writer.entries(), 0);
    }

    #[test]
    fn test_rows_in_order() {
        let mut writer = ManifestWriter::new(Vec::new()).unwrap();
        writer.record(&entry("/data/a.txt", b"hello")).unwrap();
        writer.record(&entry("/data/b.txt", b"")).unwrap();

        let text = String::from_utf8(writer.get_ref().clone()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "/data/a.txt,2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(lines[2].starts_with("/data/b.txt,e3b0c442"));
        assert_eq!(writer.entries(), 2);
    }

    #[test]
    fn test_paths_with_commas_are_quoted() {
        let mut writer = ManifestWriter::new(Vec::new()).unwrap();
        writer.record(&entry("/data/a,b.txt", b"x")).unwrap();

        let text = String::from_utf8(writer.get_ref().clone()).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("\"/data/a,b.txt\","));
    }

    #[test]
    fn test_file_is_flushed_after_each_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manifest.csv");
        let mut writer = ManifestWriter::create(&path).unwrap();
        writer.record(&entry("/x", b"x")).unwrap();

        // Read while the writer is still open.
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}

use crate::{ContentDigest, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Streams a file through SHA-256 in fixed-size reads.
#[derive(Debug, Clone)]
pub struct FileHasher {
    buffer_size: usize,
}

impl FileHasher {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Reads `reader` to end of stream. Read errors are returned as-is.
    pub async fn hash_reader<R: AsyncRead + Unpin>(&self, mut reader: R) -> Result<ContentDigest> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(ContentDigest::new(hasher.finalize().into()))
    }

    pub async fn hash_file<P: AsRef<Path>>(&self, path: P) -> Result<ContentDigest> {
        let file = File::open(path.as_ref()).await?;
        self.hash_reader(file).await
    }
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to scan {path}: {message}")]
    Scan { path: String, message: String },

    #[error("Manifest write failed: {0}")]
    Manifest(#[from] csv::Error),

    #[error("Invalid SHA-256 digest: {0}")]
    InvalidDigest(String),

    #[error("Backend error: {0}")]
    Backend(String),

    /// A remote failure the store reported as worth repeating: throttling,
    /// a 5xx status, a dropped connection or a transport timeout.
    #[error("Transient backend error: {0}")]
    Transient(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

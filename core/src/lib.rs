pub mod error;
pub mod hasher;
pub mod manifest;
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod scanner;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use hasher::FileHasher;
pub use manifest::{ManifestEntry, ManifestWriter};
pub use memory::MemoryStore;
pub use orchestrator::{
    BackupOptions, BatchSummary, DuplicateCheck, FileOutcome, FileReport, ManifestTiming,
    Orchestrator,
};
pub use progress::{Milestone, ProgressSink};
pub use scanner::{FileScanner, ScanReport};
pub use store::{ObjectInfo, RemoteStore, StoreType};
pub use types::*;

pub mod dry_run;
pub mod local;
pub mod retry;
pub mod s3;

pub use dry_run::DryRunStore;
pub use local::LocalBackend;
pub use retry::{RetryConfig, Retryable, RetryingStore, retry_with_backoff};
pub use s3::S3Backend;
pub use shardcas_core::store::{ObjectInfo, RemoteStore, StoreType};

use async_trait::async_trait;
use rand::Rng;
use shardcas_core::store::{ObjectInfo, RemoteStore, StoreType};
use shardcas_core::{ContentDigest, Error, ObjectKey, Result};
use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// `retries` additional attempts after the first failure.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Default::default()
        }
    }

    fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_duration = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let duration_ms = base_duration.min(self.max_backoff.as_millis() as f64) as u64;
        let mut duration = Duration::from_millis(duration_ms);

        // Up to 25% extra
        if self.jitter {
            let jitter_ms = rand::thread_rng().gen_range(0..=(duration_ms / 4));
            duration += Duration::from_millis(jitter_ms);
        }

        duration
    }
}

/// Trait to determine if an error is retryable
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transient(_) | Error::Timeout { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
            ),
            // Transience is decided by the store that built the error.
            Error::Backend(_)
            | Error::Scan { .. }
            | Error::Manifest(_)
            | Error::InvalidDigest(_)
            | Error::Config(_)
            | Error::Other(_) => false,
        }
    }
}

/// Retry a future operation with exponential backoff
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_retryable() {
                    debug!(
                        operation = operation_name,
                        error = %error,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(error);
                }

                attempt += 1;
                if attempt >= max_attempts {
                    if max_attempts > 1 {
                        warn!(
                            operation = operation_name,
                            max_attempts,
                            error = %error,
                            "Operation failed after all retry attempts"
                        );
                    }
                    return Err(error);
                }

                let backoff = config.backoff_duration(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis(),
                    error = %error,
                    "Operation failed, retrying after backoff"
                );
                sleep(backoff).await;
            }
        }
    }
}

/// Retries transient store failures with backoff. Uploads are safe to repeat
/// because the key is derived from the content.
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    async fn init(&self) -> Result<()> {
        retry_with_backoff(&self.config, "init", || self.inner.init()).await
    }

    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>> {
        retry_with_backoff(&self.config, "stat", || self.inner.stat(key)).await
    }

    async fn checksum(&self, key: &ObjectKey) -> Result<Option<ContentDigest>> {
        retry_with_backoff(&self.config, "checksum", || self.inner.checksum(key)).await
    }

    async fn put_file(&self, key: &ObjectKey, path: &Path, digest: &ContentDigest) -> Result<()> {
        retry_with_backoff(&self.config, "put", || self.inner.put_file(key, path, digest)).await
    }

    fn store_type(&self) -> StoreType {
        self.inner.store_type()
    }
}

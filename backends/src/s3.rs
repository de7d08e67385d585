use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ChecksumAlgorithm, ChecksumMode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use shardcas_core::store::{ObjectInfo, RemoteStore, StoreType};
use shardcas_core::{ContentDigest, Error, ObjectKey, Result};
use std::path::Path;
use tracing::debug;

/// S3 or S3-compatible bucket. Credentials and region come from the default
/// AWS provider chain.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Backend {
    pub async fn new(bucket: String, prefix: String) -> Result<Self> {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        Ok(Self {
            client,
            bucket,
            prefix: normalize_prefix(&prefix),
        })
    }

    /// Targets an S3-compatible service (MinIO, Ceph, R2, ...) at `endpoint`.
    pub async fn with_endpoint(bucket: String, prefix: String, endpoint: String) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket,
            prefix: normalize_prefix(&prefix),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn full_key(&self, key: &ObjectKey) -> String {
        full_key(&self.prefix, key)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

fn full_key(prefix: &str, key: &ObjectKey) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

/// S3 reports SHA-256 checksums base64-encoded. Multipart objects carry a
/// checksum-of-checksums with a `-N` suffix, which is not a content digest.
fn decode_checksum(value: &str) -> Option<ContentDigest> {
    if value.contains('-') {
        return None;
    }
    let bytes = BASE64.decode(value).ok()?;
    let array: [u8; 32] = bytes.try_into().ok()?;
    Some(ContentDigest::new(array))
}

/// Error codes S3 and compatible services use for throttling and overload.
const TRANSIENT_CODES: &[&str] = &[
    "SlowDown",
    "RequestTimeout",
    "Throttling",
    "ThrottlingException",
    "InternalError",
    "ServiceUnavailable",
];

/// Whether a failed request is worth repeating, judged from the SDK's error
/// kind and the HTTP status or error code the service returned.
fn is_transient<E: ProvideErrorMetadata>(err: &SdkError<E>) -> bool {
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            status == 429
                || (500..600).contains(&status)
                || service
                    .err()
                    .code()
                    .is_some_and(|code| TRANSIENT_CODES.contains(&code))
        }
        _ => false,
    }
}

fn sdk_error<E>(context: String, err: &SdkError<E>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = format!("{}: {}", context, DisplayErrorContext(err));
    if is_transient(err) {
        Error::Transient(message)
    } else {
        Error::Backend(message)
    }
}

#[async_trait]
impl RemoteStore for S3Backend {
    async fn init(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Bucket {} not accessible", self.bucket), &e))?;
        Ok(())
    }

    async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectInfo>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return Ok(None);
                }
                return Err(sdk_error(format!("Failed to stat {}", key), &e));
            }
        };

        let size = response
            .content_length()
            .and_then(|length| u64::try_from(length).ok());
        let modified = response
            .last_modified()
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()));

        Ok(Some(ObjectInfo {
            key: key.clone(),
            size,
            modified,
        }))
    }

    async fn checksum(&self, key: &ObjectKey) -> Result<Option<ContentDigest>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .checksum_mode(ChecksumMode::Enabled)
            .send()
            .await;

        match result {
            Ok(response) => Ok(response.checksum_sha256().and_then(decode_checksum)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(sdk_error(format!("Failed to read checksum of {}", key), &e)),
        }
    }

    async fn put_file(&self, key: &ObjectKey, path: &Path, digest: &ContentDigest) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to open {}: {}", path.display(), e)))?;

        // S3 recomputes the checksum and rejects the upload if the file
        // changed after it was hashed.
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(body)
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .checksum_sha256(BASE64.encode(digest.as_bytes()))
            .send()
            .await
            .map_err(|e| {
                sdk_error(format!("Failed to upload {} to {}", path.display(), key), &e)
            })?;
        debug!(bucket = %self.bucket, key = %key, "Put object");

        Ok(())
    }

    fn store_type(&self) -> StoreType {
        StoreType::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::http::HttpResponse;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::put_object::PutObjectError;
    use aws_sdk_s3::primitives::SdkBody;

    #[test]
    fn test_full_key_with_and_without_prefix() {
        let key = ObjectKey::from_digest(&ContentDigest::from_data(b"hello"));
        assert_eq!(full_key("", &key), key.to_string());
        assert_eq!(
            full_key(&normalize_prefix("/backups/laptop/"), &key),
            format!("backups/laptop/{}", key)
        );
    }

    fn service_error(status: u16, code: &str) -> SdkError<PutObjectError> {
        let response = HttpResponse::new(status.try_into().unwrap(), SdkBody::empty());
        SdkError::service_error(
            PutObjectError::generic(ErrorMetadata::builder().code(code).build()),
            response,
        )
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&service_error(503, "ServiceUnavailable")));
        assert!(is_transient(&service_error(500, "InternalError")));
        assert!(is_transient(&service_error(429, "TooManyRequests")));
        assert!(is_transient(&service_error(400, "RequestTimeout")));
        assert!(!is_transient(&service_error(403, "AccessDenied")));
        assert!(!is_transient(&service_error(400, "BadDigest")));
        let timeout: SdkError<PutObjectError> = SdkError::timeout_error("slow");
        assert!(is_transient(&timeout));
        let malformed: SdkError<PutObjectError> = SdkError::construction_failure("bad request");
        assert!(!is_transient(&malformed));
    }

    #[test]
    fn test_permanent_error_stays_permanent_whatever_the_key() {
        // Paths and hex keys routinely contain "500" or "429".
        let err = sdk_error(
            "Failed to upload /home/me/IMG_5001.jpg to cas/4/2/429500".to_string(),
            &service_error(403, "AccessDenied"),
        );
        assert!(matches!(err, Error::Backend(_)));

        let err = sdk_error("Failed to stat x".to_string(), &service_error(503, "SlowDown"));
        assert!(matches!(err, Error::Transient(_)));
    }

    #[test]
    fn test_decode_checksum() {
        let digest = ContentDigest::from_data(b"hello");
        let encoded = BASE64.encode(digest.as_bytes());
        assert_eq!(decode_checksum(&encoded), Some(digest));
        assert_eq!(decode_checksum(&format!("{}-3", encoded)), None);
        assert_eq!(decode_checksum("not base64!"), None);
        assert_eq!(decode_checksum(&BASE64.encode(b"short")), None);
    }
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::Error;

/// Top-level namespace every content-addressed object lives under.
pub const CAS_ROOT: &str = "cas";

/// SHA-256 over the full byte stream of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_data(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_string(&self) -> String {
        self.to_hex().chars().take(10).collect()
    }
}

impl From<[u8; 32]> for ContentDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for ContentDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut array = [0u8; 32];
        hex::decode_to_slice(s, &mut array)
            .map_err(|e| Error::InvalidDigest(format!("{s:?}: {e}")))?;
        Ok(Self(array))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentDigest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Remote storage key derived from a digest: `cas/<c1>/<c2>/<digest>`.
///
/// The two single-character shard levels spread objects across the store's
/// namespace. A key is never stored on its own; it is always recomputed from
/// the digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn from_digest(digest: &ContentDigest) -> Self {
        let hex = digest.to_hex();
        Self(format!("{}/{}/{}/{}", CAS_ROOT, &hex[0..1], &hex[1..2], hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&ContentDigest> for ObjectKey {
    fn from(digest: &ContentDigest) -> Self {
        Self::from_digest(digest)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A regular file found by the scanner, with the size observed at scan time.
///
/// The size is only used for the remote duplicate check; it is not
/// re-verified before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileToProcess {
    pub path: PathBuf,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_digest_of_known_content() {
        let digest = ContentDigest::from_data(b"hello");
        assert_eq!(digest.to_hex(), HELLO_SHA256);
        assert_eq!(digest.short_string(), "2cf24dba5f");
    }

    #[test]
    fn test_key_uses_two_shard_levels() {
        let digest: ContentDigest = HELLO_SHA256.parse().unwrap();
        let key = ObjectKey::from_digest(&digest);
        assert_eq!(key.as_str(), format!("cas/2/c/{}", HELLO_SHA256));
    }

    #[test]
    fn test_identical_content_gives_identical_key() {
        let a = ObjectKey::from_digest(&ContentDigest::from_data(b"same bytes"));
        let b = ObjectKey::from_digest(&ContentDigest::from_data(b"same bytes"));
        let c = ObjectKey::from_digest(&ContentDigest::from_data(b"other bytes"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_malformed_digest_rejected() {
        assert!("not-hex".parse::<ContentDigest>().is_err());
        assert!("abcd".parse::<ContentDigest>().is_err());
        assert!(HELLO_SHA256.to_uppercase().parse::<ContentDigest>().is_ok());
    }

    #[test]
    fn test_digest_serde_as_hex_string() {
        let digest = ContentDigest::from_data(b"hello");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", HELLO_SHA256));
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}

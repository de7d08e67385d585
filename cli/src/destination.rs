use anyhow::{Result, anyhow};
use std::path::PathBuf;

/// Where objects are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    S3 { bucket: String, prefix: String },
    Local(PathBuf),
}

impl Destination {
    /// Accepts `s3://bucket[/prefix]`, a bare bucket name, `file:///dir`, or
    /// anything path-like (`./dir`, `/dir`, `a/b`).
    pub fn parse(value: &str) -> Result<Self> {
        if let Some(rest) = value.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(anyhow!("Missing bucket name in {}", value));
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
            });
        }

        if let Some(path) = value.strip_prefix("file://") {
            if path.is_empty() {
                return Err(anyhow!("Missing directory in {}", value));
            }
            return Ok(Self::Local(PathBuf::from(path)));
        }

        if value.is_empty() {
            return Err(anyhow!("Destination must not be empty"));
        }

        if value.contains('/') || value.contains('\\') || value.starts_with('.') {
            Ok(Self::Local(PathBuf::from(value)))
        } else {
            Ok(Self::S3 {
                bucket: value.to_string(),
                prefix: String::new(),
            })
        }
    }

    /// Uses `fallback` as the S3 key prefix unless the destination names one.
    pub fn with_default_prefix(self, fallback: Option<&str>) -> Self {
        match self {
            Self::S3 { bucket, prefix } if prefix.is_empty() => Self::S3 {
                bucket,
                prefix: fallback.unwrap_or("").trim_matches('/').to_string(),
            },
            other => other,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{}", bucket),
            Self::S3 { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
            Self::Local(path) => write!(f, "file://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3(bucket: &str, prefix: &str) -> Destination {
        Destination::S3 {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_bare_bucket() {
        assert_eq!(Destination::parse("my-backups").unwrap(), s3("my-backups", ""));
    }

    #[test]
    fn test_s3_url() {
        assert_eq!(Destination::parse("s3://b").unwrap(), s3("b", ""));
        assert_eq!(Destination::parse("s3://b/host/a/").unwrap(), s3("b", "host/a"));
        assert!(Destination::parse("s3://").is_err());
        assert!(Destination::parse("s3:///x").is_err());
    }

    #[test]
    fn test_local_paths() {
        assert_eq!(
            Destination::parse("file:///mnt/nas").unwrap(),
            Destination::Local(PathBuf::from("/mnt/nas"))
        );
        assert_eq!(
            Destination::parse("./store").unwrap(),
            Destination::Local(PathBuf::from("./store"))
        );
        assert_eq!(
            Destination::parse("/srv/cas").unwrap(),
            Destination::Local(PathBuf::from("/srv/cas"))
        );
        assert!(Destination::parse("").is_err());
        assert!(Destination::parse("file://").is_err());
    }

    #[test]
    fn test_default_prefix() {
        let dest = Destination::parse("b").unwrap().with_default_prefix(Some("/laptop/"));
        assert_eq!(dest, s3("b", "laptop"));

        let dest = Destination::parse("s3://b/own").unwrap().with_default_prefix(Some("laptop"));
        assert_eq!(dest, s3("b", "own"));
        assert_eq!(dest.to_string(), "s3://b/own");
    }
}

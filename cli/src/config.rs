use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::Deserialize;
use shardcas_core::{DuplicateCheck, ManifestTiming};
use std::path::{Path, PathBuf};

/// Settings read from `config.toml`. Every field is optional; command-line
/// flags and environment variables take precedence.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub prefix: Option<String>,
    pub endpoint: Option<String>,
    /// Directory for generated manifest names when `--output-csv` is absent.
    pub manifest_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub hash_buffer_kib: Option<usize>,
    pub manifest_timing: Option<ManifestTiming>,
    pub duplicate_check: Option<DuplicateCheck>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "shardcas").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// An explicit path must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| anyhow!("{}", e))
    }
}

use anyhow::{Context, Result};
use clap::Args;
use shardcas_core::{FileHasher, ObjectKey};
use std::path::PathBuf;

#[derive(Args)]
pub struct HashCommand {
    #[arg(required = true, help = "Files to hash")]
    files: Vec<PathBuf>,
}

impl HashCommand {
    pub async fn run(&self) -> Result<()> {
        let hasher = FileHasher::default();

        for path in &self.files {
            let digest = hasher
                .hash_file(path)
                .await
                .with_context(|| format!("Failed to hash {}", path.display()))?;
            println!("{}  {}  {}", digest, ObjectKey::from_digest(&digest), path.display());
        }

        Ok(())
    }
}

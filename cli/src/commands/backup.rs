use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use indicatif::HumanBytes;
use shardcas_backends::{
    DryRunStore, LocalBackend, RemoteStore, RetryConfig, RetryingStore, S3Backend,
};
use shardcas_core::{
    BackupOptions, BatchSummary, DuplicateCheck, FileScanner, ManifestTiming, ManifestWriter,
    Orchestrator,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::destination::Destination;
use crate::power::{PowerSource, SysfsPowerSource};
use crate::progress::BarProgress;

/// Exit status when the run was refused because the machine is on battery.
const EXIT_ON_BATTERY: u8 = 1;
/// Exit status for `--strict` runs where some file failed.
const EXIT_INCOMPLETE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    Text,
    Json,
    #[value(name = "none")]
    Off,
}

#[derive(Args)]
pub struct BackupCommand {
    #[arg(help = "Destination: bucket name, s3://bucket/prefix, file:///dir or a local path")]
    destination: String,

    #[arg(required = true, help = "Directories to back up")]
    dirs: Vec<PathBuf>,

    #[arg(long, help = "Run even when the machine is on battery power")]
    battery: bool,

    #[arg(
        long = "output-csv",
        visible_alias = "manifest",
        value_name = "PATH",
        help = "Manifest file (default: timestamped file in the manifest directory)"
    )]
    output_csv: Option<PathBuf>,

    #[arg(long, env = "SHARDCAS_PREFIX", help = "Key prefix inside the bucket")]
    prefix: Option<String>,

    #[arg(long, env = "SHARDCAS_ENDPOINT", help = "S3-compatible endpoint URL")]
    endpoint: Option<String>,

    #[arg(short, long, help = "Files processed concurrently (default 1)")]
    jobs: Option<usize>,

    #[arg(long, value_name = "SECS", help = "Timeout for each remote call")]
    timeout: Option<u64>,

    #[arg(long, help = "Retries for transient remote errors (default 0)")]
    retries: Option<u32>,

    #[arg(
        long,
        value_name = "before-upload|after-outcome",
        help = "When manifest rows are written"
    )]
    manifest_timing: Option<ManifestTiming>,

    #[arg(
        long,
        value_name = "size-only|checksum",
        help = "Evidence required to skip an upload"
    )]
    duplicate_check: Option<DuplicateCheck>,

    #[arg(long, help = "Check the store but do not upload anything")]
    dry_run: bool,

    #[arg(long, help = "Show a progress bar")]
    progress: bool,

    #[arg(long, help = "Exit with status 2 if any file failed")]
    strict: bool,

    #[arg(long, value_enum, default_value = "text", help = "Summary printed at the end")]
    summary: SummaryFormat,
}

impl BackupCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<ExitCode> {
        let status = self
            .execute(cli.config.as_deref(), &SysfsPowerSource::default())
            .await?;
        Ok(ExitCode::from(status))
    }

    /// Runs the backup and returns the process exit status.
    async fn execute(&self, config_path: Option<&Path>, power: &dyn PowerSource) -> Result<u8> {
        if let Some(status) = self.gate(power)? {
            return Ok(status);
        }

        let config = Config::load(config_path)?;
        let options = self.options(&config);

        let destination = Destination::parse(&self.destination)?
            .with_default_prefix(self.prefix.as_deref().or(config.prefix.as_deref()));
        let store = self.build_store(&destination, &config, &options).await?;
        store
            .init()
            .await
            .with_context(|| format!("Failed to open store {}", destination))?;
        info!("Backing up to {}", destination);

        info!("Scanning directories...");
        let scan = FileScanner::new(self.dirs.iter().cloned()).scan();
        for error in &scan.errors {
            warn!(error = %error, "Part of the tree was skipped");
        }
        info!(
            "Will process {} files, a total of {}",
            scan.files.len(),
            HumanBytes(scan.total_bytes())
        );

        let manifest_path = self.manifest_path(&config);
        info!("Writing to {}", manifest_path.display());
        let manifest = ManifestWriter::create(&manifest_path)
            .with_context(|| format!("Failed to create manifest {}", manifest_path.display()))?;

        let bar = self
            .progress
            .then(|| Arc::new(BarProgress::new(scan.files.len() as u64)));
        let mut orchestrator = Orchestrator::new(store, manifest, options);
        if let Some(bar) = &bar {
            orchestrator = orchestrator.with_progress(bar.clone());
        }

        let mut summary = orchestrator.run(&scan.files).await?;
        summary.scan_errors = scan.errors.len() as u64;
        if let Some(bar) = &bar {
            bar.finish();
        }

        self.print_summary(&summary, &manifest_path)?;

        if self.strict && !summary.is_clean() {
            return Ok(EXIT_INCOMPLETE);
        }
        Ok(0)
    }

    /// `Some(status)` when the run must not start.
    fn gate(&self, power: &dyn PowerSource) -> Result<Option<u8>> {
        if self.battery {
            debug!("Power source check bypassed");
            return Ok(None);
        }
        if !power
            .on_external_power()
            .context("Failed to read power source state")?
        {
            warn!("Not doing anything; we're on battery!");
            return Ok(Some(EXIT_ON_BATTERY));
        }
        Ok(None)
    }

    fn options(&self, config: &Config) -> BackupOptions {
        let defaults = BackupOptions::default();
        BackupOptions {
            hash_buffer_size: config
                .hash_buffer_kib
                .map(|kib| kib * 1024)
                .unwrap_or(defaults.hash_buffer_size),
            manifest_timing: self
                .manifest_timing
                .or(config.manifest_timing)
                .unwrap_or(defaults.manifest_timing),
            duplicate_check: self
                .duplicate_check
                .or(config.duplicate_check)
                .unwrap_or(defaults.duplicate_check),
            remote_timeout: self
                .timeout
                .or(config.timeout_secs)
                .map(Duration::from_secs),
            jobs: self.jobs.or(config.jobs).unwrap_or(defaults.jobs).max(1),
            dry_run: self.dry_run,
        }
    }

    fn manifest_path(&self, config: &Config) -> PathBuf {
        if let Some(path) = &self.output_csv {
            return path.clone();
        }
        let name = format!(
            "shardcas-manifest-{}.csv",
            chrono::Local::now().format("%Y%m%dT%H%M%S")
        );
        config
            .manifest_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(name)
    }

    async fn build_store(
        &self,
        destination: &Destination,
        config: &Config,
        options: &BackupOptions,
    ) -> Result<Box<dyn RemoteStore>> {
        let endpoint = self.endpoint.as_ref().or(config.endpoint.as_ref());
        let mut store: Box<dyn RemoteStore> = match (destination, endpoint) {
            (Destination::S3 { bucket, prefix }, Some(endpoint)) => Box::new(
                S3Backend::with_endpoint(bucket.clone(), prefix.clone(), endpoint.clone()).await?,
            ),
            (Destination::S3 { bucket, prefix }, None) => {
                Box::new(S3Backend::new(bucket.clone(), prefix.clone()).await?)
            }
            (Destination::Local(path), _) => Box::new(LocalBackend::new(path)),
        };

        let retries = self.retries.or(config.retries).unwrap_or(0);
        if retries > 0 {
            let retry = RetryConfig::with_retries(retries);
            store = Box::new(RetryingStore::new(store, retry));
        }

        if self.dry_run {
            println!("DRY RUN - no data will be uploaded");
            store = Box::new(DryRunStore::new(store));
        }

        info!(
            store = ?store.store_type(),
            jobs = options.jobs,
            duplicate_check = ?options.duplicate_check,
            manifest_timing = ?options.manifest_timing,
            "Store ready"
        );
        Ok(store)
    }

    fn print_summary(&self, summary: &BatchSummary, manifest_path: &Path) -> Result<()> {
        match self.summary {
            SummaryFormat::Off => {}
            SummaryFormat::Json => {
                println!("{}", serde_json::to_string_pretty(summary)?);
            }
            SummaryFormat::Text => {
                println!("Files:     {} ({})", summary.files, HumanBytes(summary.bytes));
                println!(
                    "Uploaded:  {} ({})",
                    summary.uploaded,
                    HumanBytes(summary.uploaded_bytes)
                );
                println!(
                    "Skipped:   {} ({})",
                    summary.skipped,
                    HumanBytes(summary.skipped_bytes)
                );
                if self.dry_run {
                    println!(
                        "Would upload: {} ({})",
                        summary.would_upload,
                        HumanBytes(summary.would_upload_bytes)
                    );
                }
                println!("Failed:    {}", summary.failed);
                if summary.scan_errors > 0 {
                    println!("Unreadable parts of the tree: {}", summary.scan_errors);
                }
                println!(
                    "Manifest:  {} ({} entries)",
                    manifest_path.display(),
                    summary.manifest_entries
                );
                for failure in &summary.failures {
                    println!("  failed: {} ({})", failure.path.display(), failure.error);
                }
            }
        }
        Ok(())
    }
}

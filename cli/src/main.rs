mod commands;
mod config;
mod destination;
mod power;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{backup::BackupCommand, hash::HashCommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "shardcas",
    version,
    about = "Content-addressed deduplicating uploader",
    long_about = "Shardcas hashes every file under the given directories and uploads each \
                  content once, keyed by its SHA-256, to an S3 bucket or a local directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "SHARDCAS_CONFIG", help = "Config file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Upload every file under the given directories")]
    Backup(BackupCommand),

    #[command(about = "Print the digest and store key of files")]
    Hash(HashCommand),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    debug!("Starting Shardcas");

    match cli.command {
        Commands::Backup(ref cmd) => cmd.run(&cli).await,
        Commands::Hash(ref cmd) => cmd.run().await.map(|()| ExitCode::SUCCESS),
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "shardcas_cli={level},shardcas_core={level},shardcas_backends={level}"
        ))
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

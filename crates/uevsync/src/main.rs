//! uevsync: UE-V configuration script distribution
//!
//! Main binary with subcommands:
//! - `deploy`: list the container, download the script, reconcile the scheduled task
//! - `list`: print the container listing

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use miette::Result;
use tracing::info;

mod config;
mod deploy;
mod list;
mod transcript;

use config::{DeployArgs, RunConfig};

#[derive(Parser)]
#[command(name = "uevsync")]
#[command(about = "Distributes the UE-V configuration script and schedules it daily", long_about = None)]
struct Cli {
    /// Directory for the run transcript (defaults to the temp directory)
    #[arg(long, env = "UEVSYNC_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the script and create or update the scheduled task
    Deploy(DeployArgs),

    /// Print the blobs of a container
    List {
        /// Container listing URL
        #[arg(long, env = "UEVSYNC_LISTING_URL")]
        listing_url: String,

        /// Per-request HTTP timeout in seconds
        #[arg(long, env = "UEVSYNC_HTTP_TIMEOUT_SECS")]
        http_timeout_secs: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let started = Local::now();

    // Keep the guard alive so the transcript is flushed on exit
    let transcript = transcript::init(cli.log_dir.as_deref(), started)?;
    if let Some((path, _)) = &transcript {
        info!(transcript = %path.display(), "transcript started");
    }

    match cli.command {
        Commands::Deploy(args) => deploy::run(&RunConfig::from(args)).await,

        Commands::List {
            listing_url,
            http_timeout_secs,
        } => {
            let client = match http_timeout_secs {
                Some(secs) => uevsync_blob::BlobClient::with_timeout(Duration::from_secs(secs)),
                None => uevsync_blob::BlobClient::new(),
            }
            .map_err(|e| miette::miette!("failed to create HTTP client: {}", e))?;
            list::run(&client, &listing_url).await
        }
    }
}

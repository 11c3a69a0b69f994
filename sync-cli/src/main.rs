//! # wearsync
//!
//! CLI tool for the wearsync store-and-forward engine.
//!
//! ## Commands
//!
//! - `record`: Record simulated sensor samples into the local store
//! - `sync`: Run one sync pass into a spool directory
//! - `status`: Show pending rows per sensor and the sync cursor
//! - `export`: Export a sensor's stored rows as CSV
//! - `decode`: Decode a received chunk file
//!
//! ## Example
//!
//! ```bash
//! # Record 250 heart-rate samples
//! wearsync record --sensor hr --count 250
//!
//! # Sync into the host's inbox
//! wearsync sync --spool /mnt/host/inbox
//!
//! # Inspect what arrived
//! wearsync decode /mnt/host/inbox/sensor_data-*.chunk
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{decode, export, record, status, sync};

/// CLI tool for the wearsync store-and-forward engine.
#[derive(Parser, Debug)]
#[command(name = "wearsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the sample database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: <data-dir>/wearsync.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record simulated sensor samples
    Record {
        /// Sensor to record (repeatable; default: every configured sensor)
        #[arg(long, short)]
        sensor: Vec<String>,

        /// Samples per sensor
        #[arg(long, short, default_value = "100")]
        count: usize,

        /// Milliseconds between samples
        #[arg(long, default_value = "1000")]
        interval_ms: i64,
    },

    /// Run one sync pass into a spool directory
    Sync {
        /// Directory standing in for the host inbox
        #[arg(long)]
        spool: PathBuf,
    },

    /// Show pending rows and the sync cursor
    Status,

    /// Export a sensor's stored rows as CSV
    Export {
        /// Sensor to export
        #[arg(long, short)]
        sensor: String,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Delete the exported rows afterwards
        #[arg(long)]
        clear: bool,
    },

    /// Decode a received chunk file
    Decode {
        /// Chunk file to decode
        file: PathBuf,

        /// Print the rows as well
        #[arg(long)]
        rows: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        // Decoding a chunk needs neither data dir nor config
        Commands::Decode { file, rows } => {
            decode::run(&file, rows).await?;
        }
        Commands::Record {
            sensor,
            count,
            interval_ms,
        } => {
            let config = load_config(cli.data_dir, cli.config.as_deref()).await?;
            record::run(&config, &sensor, count, interval_ms).await?;
        }
        Commands::Sync { spool } => {
            let config = load_config(cli.data_dir, cli.config.as_deref()).await?;
            sync::run(&config, &spool).await?;
        }
        Commands::Status => {
            let config = load_config(cli.data_dir, cli.config.as_deref()).await?;
            status::run(&config).await?;
        }
        Commands::Export {
            sensor,
            output,
            clear,
        } => {
            let config = load_config(cli.data_dir, cli.config.as_deref()).await?;
            export::run(&config, &sensor, output.as_deref(), clear).await?;
        }
    }

    Ok(())
}

/// Resolve the data directory, create it, and load the configuration.
async fn load_config(
    data_dir: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<wearsync_client::Config> {
    // Determine data directory
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    config::load(&data_dir, config_path)
}

/// Get the default data directory for wearsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "wearsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

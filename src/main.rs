mod commands;
mod config;
mod download;
mod extract;
mod feed;
mod fetch;
mod logging;
mod sanitize;
mod snapshot;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::run_command;

/// Command-line arguments for dojo-sync
#[derive(Parser, Debug)]
#[command(name = "dojo-sync")]
#[command(about = "Download the photos and videos from a ClassDojo story feed")]
pub struct Cli {
    /// Skip attachments dated before this day (YYYY-MM-DD, compared as text)
    #[arg(long, value_name = "DAY", global = true)]
    pub not_before: Option<String>,

    /// Feed URL to start from (overrides env and config)
    #[arg(long, global = true)]
    pub feed_url: Option<String>,

    /// Directory in which each run creates its own output directory
    #[arg(long, value_name = "DIR", global = true)]
    pub output_root: Option<PathBuf>,

    /// Write into this directory instead of a fresh one; existing files are skipped
    #[arg(long, value_name = "DIR", global = true)]
    pub into: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Cmd>,
}

/// Subcommands for dojo-sync
#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Fetch the feed and download new attachments (the default)
    Sync,

    /// List what a saved data.json would download, without touching the network
    Inspect {
        /// Path to a data.json snapshot
        snapshot: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let cfg = config::load_config(&cli)?;
    tracing::debug!(?cfg, "resolved configuration");

    run_command(cli, &cfg)
}

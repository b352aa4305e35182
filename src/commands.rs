use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::download::{Downloader, SyncReport};
use crate::extract::extract_entries;
use crate::feed::collect_items;
use crate::fetch::{HttpFetcher, Transport};
use crate::snapshot::{load_snapshot, save_snapshot};
use crate::{Cli, Cmd};

pub fn run_command(cli: Cli, cfg: &Config) -> Result<()> {
    match cli.command {
        Some(Cmd::Inspect { snapshot }) => {
            cmd_inspect(cfg, &snapshot)?;
        }
        Some(Cmd::Sync) | None => {
            cmd_sync(cfg)?;
        }
    }

    Ok(())
}

/// Fetch the whole feed and download everything not already on disk
fn cmd_sync(cfg: &Config) -> Result<()> {
    let cookies = config::load_session_cookies()?;
    let fetcher = HttpFetcher::new(&cookies, cfg.request_timeout)?;
    let dest = prepare_output_dir(cfg)?;

    println!("Starting");
    println!("Output directory: {}", dest.display().to_string().blue());

    let report = sync(&fetcher, cfg, &dest)?;

    match &report.latest_day {
        Some(day) => println!("Last day of data download: {}", day.bold()),
        None => println!("Nothing to download."),
    }
    println!(
        "Done! {} downloaded, {} already present, {} new description(s).",
        report.downloaded, report.skipped, report.descriptions
    );
    Ok(())
}

/// Gather the feed, snapshot it, extract entries, then download them.
pub fn sync(transport: &dyn Transport, cfg: &Config, dest: &Path) -> Result<SyncReport> {
    let items = collect_items(transport, &cfg.feed_url)?;

    let snapshot = save_snapshot(dest, &items)?;
    tracing::info!(path = %snapshot.display(), "saved feed snapshot");

    let extraction = extract_entries(&items, &cfg.cutoff)?;
    tracing::info!(
        entries = extraction.entries.len(),
        attachments = extraction.total,
        cutoff = cfg.cutoff.as_deref().unwrap_or("none"),
        "extracted attachments"
    );

    Downloader::new(transport, dest).download_all(&extraction.entries, extraction.total)
}

/// Use `--into` as-is, otherwise create a fresh directory under the output root
fn prepare_output_dir(cfg: &Config) -> Result<PathBuf> {
    if let Some(dir) = &cfg.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory '{}'", dir.display()))?;
        return Ok(dir.clone());
    }

    fs::create_dir_all(&cfg.output_root).with_context(|| {
        format!(
            "Failed to create output root '{}'",
            cfg.output_root.display()
        )
    })?;
    let dir = tempfile::Builder::new()
        .prefix("sync-")
        .tempdir_in(&cfg.output_root)
        .with_context(|| {
            format!(
                "Failed to create a run directory in '{}'",
                cfg.output_root.display()
            )
        })?;
    Ok(dir.keep())
}

/// Show what a saved snapshot would download under the current cutoff
fn cmd_inspect(cfg: &Config, path: &Path) -> Result<()> {
    let items = load_snapshot(path)?;
    let extraction = extract_entries(&items, &cfg.cutoff)?;

    if extraction.entries.is_empty() {
        println!("No attachments to download in {}.", path.display());
        return Ok(());
    }

    for entry in &extraction.entries {
        println!(
            "{} | {} | {} | {} attachment(s)",
            entry.day,
            entry.group,
            entry.base_name.bold(),
            entry.attachments.len()
        );
    }
    println!(
        "{} item(s), {} entries, {} attachment(s) in total.",
        items.len(),
        extraction.entries.len(),
        extraction.total
    );
    Ok(())
}

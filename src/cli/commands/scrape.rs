//! Scrape and upload commands.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::snapshot;
use anyhow::Result;
use std::path::PathBuf;

/// Scrape URLs into a local snapshot, optionally uploading it.
pub async fn run_scrape(
    urls: &[String],
    output: Option<String>,
    upload: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let path = snapshot_path(output.as_deref(), &settings);
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Scraping {} URL(s)...", urls.len()));
    let chunks = orchestrator.scrape(urls).await;
    spinner.finish_and_clear();
    let chunks = chunks?;

    if chunks.is_empty() {
        Output::warning("No content was scraped. Check the URLs and try again.");
        return Ok(());
    }

    snapshot::save(&path, &chunks)?;
    Output::success(&format!("Saved {} chunks to {}", chunks.len(), path.display()));

    if upload {
        let spinner = Output::spinner("Uploading to vector store...");
        let uploaded = orchestrator.upload_snapshot(&path).await;
        spinner.finish_and_clear();
        Output::success(&format!("Uploaded {} vectors", uploaded?));
    } else {
        Output::info("Upload later with: advisor upload");
    }

    Ok(())
}

/// Upload a previously written snapshot.
pub async fn run_upload(input: Option<String>, settings: Settings) -> Result<()> {
    preflight::check(Operation::Index, &settings)?;

    let path = snapshot_path(input.as_deref(), &settings);
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Uploading {}...", path.display()));
    let uploaded = orchestrator.upload_snapshot(&path).await;
    spinner.finish_and_clear();

    match uploaded {
        Ok(0) => Output::warning("Snapshot is empty, nothing uploaded."),
        Ok(count) => Output::success(&format!("Uploaded {} vectors", count)),
        Err(e) => {
            Output::error(&format!("Upload failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}

fn snapshot_path(explicit: Option<&str>, settings: &Settings) -> PathBuf {
    match explicit {
        Some(path) => Settings::expand_path(path),
        None => settings.snapshot_path(),
    }
}

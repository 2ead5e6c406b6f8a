//! Batch ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{load_requests, BatchStatus, Orchestrator};
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

/// Run the batch command over a JSON or TOML document list.
pub async fn run_batch(file: &str, force: bool, settings: Settings) -> Result<()> {
    let path = Settings::expand_path(file);
    let requests = load_requests(&path)
        .with_context(|| format!("Failed to read document list {}", path.display()))?;

    preflight::check(Operation::Ingest, &settings)?;

    let orchestrator = Orchestrator::new(settings)?;

    Output::info(&format!(
        "Processing {} documents from {}",
        requests.len(),
        display_name(&path)
    ));

    let spinner = Output::spinner("Ingesting documents...");
    let report = orchestrator.process_batch(&requests, force).await;
    spinner.finish_and_clear();

    Output::header("Batch Results");
    for detail in &report.details {
        let icon = match detail.status {
            BatchStatus::Processed => style("✓").green(),
            BatchStatus::Skipped => style("-").dim(),
            BatchStatus::Failed => style("✗").red(),
        };
        match &detail.error {
            Some(error) => println!("  {} {} - {}", icon, style(&detail.title).bold(), error),
            None => println!(
                "  {} {} ({} chunks)",
                icon,
                style(&detail.title).bold(),
                detail.chunks
            ),
        }
    }

    println!();
    Output::kv("Processed", &report.processed.to_string());
    Output::kv("Skipped", &report.skipped.to_string());
    Output::kv("Failed", &report.failed.to_string());

    if report.failed > 0 {
        Output::warning(&format!("{} document(s) failed.", report.failed));
    } else {
        Output::success("Batch complete.");
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

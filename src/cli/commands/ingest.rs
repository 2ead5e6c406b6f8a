//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the ingest command for a single document.
pub async fn run_ingest(url: &str, title: Option<&str>, force: bool, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'advisor doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Processing {}...", url));
    let result = orchestrator.process_document(url, title, force).await;
    spinner.finish_and_clear();

    match result {
        Ok(result) if result.skipped => {
            Output::info(&format!(
                "'{}' is already indexed ({} chunks). Use --force to re-process.",
                result.title, result.chunks_indexed
            ));
        }
        Ok(result) => {
            Output::success(&format!("Indexed '{}'", result.title));
            Output::kv("URL", &result.url);
            if let Some(kind) = result.kind {
                Output::kv("Type", &kind.to_string());
            }
            Output::kv("Document ID", &result.document_id);
            Output::kv("Chunks", &result.chunks_indexed.to_string());
        }
        Err(e) => {
            Output::error(&format!("Failed to process {}: {}", url, e));
            return Err(e.into());
        }
    }

    Ok(())
}

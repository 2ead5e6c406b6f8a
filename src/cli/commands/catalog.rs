//! Catalog command implementation.

use crate::catalog::DocumentCatalog;
use crate::cli::{CatalogAction, Output};
use crate::config::Settings;
use crate::source::parse_url;
use anyhow::Result;

/// Run a catalog subcommand.
pub fn run_catalog(action: &CatalogAction, settings: &Settings) -> Result<()> {
    let mut catalog = DocumentCatalog::load(&settings.catalog_path());

    match action {
        CatalogAction::List => {
            if catalog.documents.is_empty() {
                Output::info("No documents processed yet. Use 'advisor ingest <url>' to add content.");
                return Ok(());
            }

            Output::header(&format!("Processed Documents ({})", catalog.documents.len()));
            println!();
            for entry in &catalog.documents {
                Output::document_info(&entry.title, &entry.url, entry.chunks_count, entry.success);
            }
        }

        CatalogAction::Summary => {
            let summary = catalog.summary();
            Output::header("Catalog Summary");
            Output::kv("Path", &catalog.path().display().to_string());
            Output::kv("Documents", &summary.total_documents.to_string());
            Output::kv("Successful", &summary.successful_documents.to_string());
            Output::kv("Failed", &summary.failed_documents.to_string());
            Output::kv("Chunks", &summary.total_chunks.to_string());
            let updated = summary
                .last_updated
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            Output::kv("Last updated", &updated);
        }

        CatalogAction::Remove { url } => {
            // Entries are keyed by the normalized URL.
            let key = parse_url(url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| url.clone());
            if catalog.remove(&key)? {
                Output::success(&format!("Removed {} from the catalog.", url));
                Output::info("Its vectors stay in the index until the document is re-ingested.");
            } else {
                Output::warning(&format!("{} is not in the catalog.", url));
            }
        }
    }

    Ok(())
}

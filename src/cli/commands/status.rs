//! Status command implementation.

use crate::catalog::DocumentCatalog;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{KnowledgeBaseStatus, Orchestrator};
use anyhow::Result;

/// Report whether the knowledge base is ready for questions.
pub async fn run_status(settings: Settings) -> Result<()> {
    preflight::check(Operation::Index, &settings)?;

    let catalog = DocumentCatalog::load(&settings.catalog_path());
    let orchestrator = Orchestrator::new(settings)?;
    let store = orchestrator.vector_store();

    Output::header("Knowledge Base");
    Output::kv("Backend", store.name());

    match orchestrator.knowledge_base_status().await? {
        KnowledgeBaseStatus::Ready(count) => {
            Output::kv("Vectors", &count.to_string());
            Output::success("Ready to answer questions.");
        }
        KnowledgeBaseStatus::Empty => {
            Output::warning("The index exists but holds no vectors. Run 'advisor ingest <url>'.");
        }
        KnowledgeBaseStatus::Missing => {
            Output::warning("The index does not exist. Run 'advisor index create' or ingest a document.");
        }
    }

    let summary = catalog.summary();
    Output::kv("Catalog documents", &summary.successful_documents.to_string());

    Ok(())
}

//! CLI command implementations.

mod ask;
mod batch;
mod catalog;
mod chat;
mod config;
mod doctor;
mod index;
mod ingest;
mod init;
mod scrape;
mod search;
mod serve;
mod status;

pub use ask::run_ask;
pub use batch::run_batch;
pub use catalog::run_catalog;
pub use chat::run_chat;
pub use config::run_config;
pub use doctor::run_doctor;
pub use index::run_index;
pub use ingest::run_ingest;
pub use init::run_init;
pub use scrape::{run_scrape, run_upload};
pub use search::run_search;
pub use serve::run_serve;
pub use status::run_status;

use crate::config::{Prompts, Settings};
use crate::orchestrator::Orchestrator;
use crate::rag::RagEngine;

/// Build a RAG engine over the orchestrator's store and embedder, with
/// prompts loaded from the configured custom directory.
pub(crate) fn rag_engine(settings: &Settings, orchestrator: &Orchestrator) -> crate::Result<RagEngine> {
    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;

    Ok(RagEngine::new(orchestrator.vector_store(), orchestrator.embedder(), &settings.rag)?
        .with_prompts(prompts))
}

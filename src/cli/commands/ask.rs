//! Ask command implementation.

use super::rag_engine;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{KnowledgeBaseStatus, Orchestrator};
use crate::rag::AskOptions;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    model: Option<String>,
    top_k: Option<usize>,
    system: Option<String>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'advisor doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings.clone())?;

    match orchestrator.knowledge_base_status().await? {
        KnowledgeBaseStatus::Missing => {
            Output::warning("The vector index does not exist yet. Ingest documents first.");
            return Ok(());
        }
        KnowledgeBaseStatus::Empty => {
            Output::warning("The knowledge base is empty. Ingest documents first.");
            return Ok(());
        }
        KnowledgeBaseStatus::Ready(_) => {}
    }

    let engine = rag_engine(&settings, &orchestrator)?;
    let options = AskOptions {
        system_prompt: system,
        top_k,
        model,
    };

    let spinner = Output::spinner("Searching knowledge base...");

    match engine.ask_with_options(question, &options).await {
        Ok(response) => {
            spinner.finish_and_clear();

            println!("\n{}\n", response.answer);

            if !response.sources.is_empty() {
                Output::header("Sources");
                for source in &response.sources {
                    Output::search_result(
                        &source.citation(),
                        source.score,
                        &source.content,
                        &source.source_url,
                    );
                }
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}

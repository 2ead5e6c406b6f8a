//! Index management command.

use crate::cli::preflight::{self, Operation};
use crate::cli::{IndexAction, Output};
use crate::config::Settings;
use crate::vector_store::create_vector_store;
use anyhow::Result;
use console::style;
use std::io::{self, Write};

/// Run an index subcommand.
pub async fn run_index(action: &IndexAction, settings: Settings) -> Result<()> {
    preflight::check(Operation::Index, &settings)?;

    let store = create_vector_store(&settings)?;

    match action {
        IndexAction::Create => {
            let dimension = settings.embedding.dimensions as usize;
            if store.ensure_index(dimension).await? {
                Output::success(&format!("Created index (dimension {})", dimension));
            } else {
                Output::info("Index already exists.");
            }
        }

        IndexAction::Stats => {
            if !store.index_exists().await? {
                Output::warning("The index does not exist.");
                return Ok(());
            }
            let stats = store.stats().await?;
            Output::header(&format!("Index Stats ({})", store.name()));
            Output::kv("Vectors", &stats.total_vector_count.to_string());
            if let Some(dimension) = stats.dimension {
                Output::kv("Dimension", &dimension.to_string());
            }
            Output::kv("Fullness", &format!("{:.2}%", stats.index_fullness * 100.0));

            // Pinecone cannot enumerate sources; the catalog covers it there.
            if let Ok(sources) = store.list_sources().await {
                if !sources.is_empty() {
                    Output::header(&format!("Indexed Sources ({})", sources.len()));
                    for source in &sources {
                        Output::kv(
                            &source.title,
                            &format!("{} ({}, {} chunks)", source.source_url, source.source_type, source.chunk_count),
                        );
                    }
                }
            }
        }

        IndexAction::Delete { yes } => {
            if !*yes && !confirm("This deletes every vector in the index. Type 'yes' to continue:")? {
                Output::info("Cancelled.");
                return Ok(());
            }
            store.delete_index().await?;
            Output::success("Index deleted.");
        }
    }

    Ok(())
}

fn confirm(message: &str) -> io::Result<bool> {
    print!("{} {} ", style("?").yellow(), message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

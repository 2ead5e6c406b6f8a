//! Pre-flight checks before expensive operations.
//!
//! Validates that required API keys are available before starting
//! operations that would otherwise fail midway.

use crate::config::{Settings, VectorStoreProvider};
use crate::error::{AdvisorError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Fetching and embedding documents needs OpenAI and the vector store.
    Ingest,
    /// Answering questions needs OpenAI and the vector store.
    Ask,
    /// Index management needs only the vector store.
    Index,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_with(operation, settings, |key| std::env::var(key).ok())
}

fn check_with<F>(operation: Operation, settings: &Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match operation {
        Operation::Ingest | Operation::Ask => {
            require_key("OPENAI_API_KEY", "sk-...", &lookup)?;
            check_vector_store(settings, &lookup)?;
        }
        Operation::Index => {
            check_vector_store(settings, &lookup)?;
        }
    }
    Ok(())
}

fn check_vector_store<F>(settings: &Settings, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if settings.vector_store.provider == VectorStoreProvider::Pinecone {
        require_key("PINECONE_API_KEY", "...", lookup)?;
    }
    Ok(())
}

fn require_key<F>(name: &str, example: &str, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(key) if !key.trim().is_empty() => Ok(()),
        Some(_) => Err(AdvisorError::Config(format!(
            "{} is empty. Set it with: export {}='{}'",
            name, name, example
        ))),
        None => Err(AdvisorError::Config(format!(
            "{} not set. Set it with: export {}='{}'",
            name, name, example
        ))),
    }
}

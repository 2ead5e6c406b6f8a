//! Context building for RAG responses.

use super::ContextChunk;
use crate::embedding::Embedder;
use crate::error::{AdvisorError, Result};
use crate::vector_store::{SearchResult, VectorStore};
use std::sync::Arc;
use tracing::debug;

/// Builds context from search results for RAG.
pub struct ContextBuilder {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_score: f32,
}

impl ContextBuilder {
    /// Create a new context builder.
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vector_store,
            embedder,
            top_k: 4,
            min_score: 0.0,
        }
    }

    /// Set the number of chunks retrieved per query.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the minimum similarity score threshold.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Build context for a query.
    pub async fn build(&self, query: &str) -> Result<Vec<ContextChunk>> {
        self.build_with_limit(query, self.top_k).await
    }

    /// Build context for a query with an explicit chunk limit.
    pub async fn build_with_limit(&self, query: &str, top_k: usize) -> Result<Vec<ContextChunk>> {
        if top_k == 0 {
            return Err(AdvisorError::InvalidInput(
                "Number of results must be at least 1".to_string(),
            ));
        }

        let query_embedding = self.embedder.embed(query).await?;

        let results = self
            .vector_store
            .query(&query_embedding, top_k, self.min_score)
            .await?;

        debug!("Retrieved {} context chunks", results.len());
        Ok(Self::from_results(results))
    }

    /// Build context from raw search results.
    pub fn from_results(results: Vec<SearchResult>) -> Vec<ContextChunk> {
        results.into_iter().map(ContextChunk::from).collect()
    }
}

/// Format context chunks for inclusion in a prompt.
pub fn format_context_for_prompt(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {}\n{}", i + 1, chunk.citation(), chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format context chunks for display to the user.
pub fn format_context_for_display(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "{} (score: {:.2})\n  {}",
                chunk.citation(),
                chunk.score,
                chunk.source_url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

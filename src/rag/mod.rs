//! RAG (Retrieval-Augmented Generation) for question answering with sources.
//!
//! Provides the ability to ask questions and get answers grounded in the
//! indexed documents.

pub mod context;
mod response;

pub use context::ContextBuilder;
pub use response::{AskOptions, RagEngine, RagResponse};

use crate::source::SourceKind;
use crate::vector_store::SearchResult;
use serde::Serialize;

/// A retrieved chunk used as context for an answer.
#[derive(Debug, Clone, Serialize)]
pub struct ContextChunk {
    /// URL of the source document.
    pub source_url: String,
    /// Title of the source document.
    pub title: String,
    /// Chunk text as stored in the index.
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub source_type: SourceKind,
    /// Page among the extracted PDF pages.
    pub page: Option<u32>,
    /// Similarity score.
    pub score: f32,
}

impl ContextChunk {
    /// Citation label, e.g. "Catalog, p. 12".
    pub fn citation(&self) -> String {
        match self.page {
            Some(page) => format!("{}, p. {}", self.title, page),
            None => self.title.clone(),
        }
    }
}

impl From<SearchResult> for ContextChunk {
    fn from(result: SearchResult) -> Self {
        let meta = result.metadata;
        Self {
            source_url: meta.source_url,
            title: meta.title,
            content: meta.content,
            chunk_index: meta.chunk_index,
            total_chunks: meta.total_chunks,
            source_type: meta.source_type,
            page: meta.page,
            score: result.score,
        }
    }
}

//! Local snapshot of scraped, embedded chunks.
//!
//! `scrape` writes the snapshot and `upload` pushes it to the vector store,
//! so embedding and indexing can run at different times.

use crate::chunking::ContentChunk;
use crate::error::{AdvisorError, Result};
use crate::source::SourceKind;
use crate::vector_store::{record_id, truncate_chars, ChunkMetadata, VectorRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A scraped chunk with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedChunk {
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(default = "default_source_type")]
    pub source_type: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub scraped_at: DateTime<Utc>,
}

fn default_source_type() -> SourceKind {
    SourceKind::Web
}

impl ScrapedChunk {
    /// Pair a chunk with its embedding.
    pub fn new(
        chunk: ContentChunk,
        source_type: SourceKind,
        embedding: Vec<f32>,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: record_id(&chunk.source_url, chunk.chunk_index),
            source_url: chunk.source_url,
            title: chunk.title,
            content: chunk.content,
            embedding,
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            source_type,
            page: chunk.page,
            scraped_at,
        }
    }
}

/// Write chunks as a pretty-printed JSON array, creating parent directories.
pub fn save(path: &Path, chunks: &[ScrapedChunk]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(chunks)?;
    std::fs::write(path, content)?;

    info!("Saved {} chunks to {:?}", chunks.len(), path);
    Ok(())
}

/// Read a snapshot written by [`save`].
pub fn load(path: &Path) -> Result<Vec<ScrapedChunk>> {
    if !path.exists() {
        return Err(AdvisorError::NotFound(format!(
            "Snapshot file {} does not exist",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let chunks: Vec<ScrapedChunk> = serde_json::from_str(&content)?;
    info!("Loaded {} chunks from {:?}", chunks.len(), path);
    Ok(chunks)
}

/// Convert snapshot chunks into vector records, truncating metadata content.
pub fn to_vector_records(chunks: &[ScrapedChunk], content_limit: usize) -> Vec<VectorRecord> {
    chunks
        .iter()
        .map(|chunk| VectorRecord {
            id: chunk.id.clone(),
            values: chunk.embedding.clone(),
            metadata: ChunkMetadata {
                source_url: chunk.source_url.clone(),
                title: chunk.title.clone(),
                content: truncate_chars(&chunk.content, content_limit),
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                source_type: chunk.source_type,
                page: chunk.page,
                processed_at: chunk.scraped_at,
            },
        })
        .collect()
}

//! Vector store abstraction for Advisor.
//!
//! Provides a trait-based interface for different vector database backends.

mod memory;
mod pinecone;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use pinecone::PineconeStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::ContentChunk;
use crate::config::{Settings, VectorStoreProvider};
use crate::error::Result;
use crate::source::SourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// URL of the source document.
    pub source_url: String,
    /// Title of the source document.
    pub title: String,
    /// Chunk text, truncated to the configured metadata limit.
    pub content: String,
    /// Position of the chunk in its document.
    #[serde(deserialize_with = "deserialize_count")]
    pub chunk_index: usize,
    /// Number of chunks in the document.
    #[serde(deserialize_with = "deserialize_count")]
    pub total_chunks: usize,
    /// Whether the document was a web page or a PDF.
    pub source_type: SourceKind,
    /// Page among the extracted PDF pages.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_page"
    )]
    pub page: Option<u32>,
    /// When the chunk was indexed.
    pub processed_at: DateTime<Utc>,
}

/// A vector with its ID and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    /// Build a record for an embedded chunk.
    pub fn from_chunk(
        chunk: &ContentChunk,
        source_type: SourceKind,
        values: Vec<f32>,
        content_limit: usize,
    ) -> Self {
        Self {
            id: record_id(&chunk.source_url, chunk.chunk_index),
            values,
            metadata: ChunkMetadata {
                source_url: chunk.source_url.clone(),
                title: chunk.title.clone(),
                content: truncate_chars(&chunk.content, content_limit),
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                source_type,
                page: chunk.page,
                processed_at: Utc::now(),
            },
        }
    }
}

/// A search result with score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Vector ID.
    pub id: String,
    /// Similarity score (higher is better).
    pub score: f32,
    /// Metadata of the matched chunk.
    pub metadata: ChunkMetadata,
}

/// Index-level statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of vectors in the index.
    pub total_vector_count: u64,
    /// Vector dimension, when known.
    pub dimension: Option<usize>,
    /// Fraction of index capacity in use (0.0 for serverless and local stores).
    pub index_fullness: f32,
}

/// Summary information about an indexed source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSource {
    pub source_url: String,
    pub title: String,
    pub source_type: SourceKind,
    /// Number of stored chunks.
    pub chunk_count: u32,
    /// Most recent indexing time.
    pub processed_at: DateTime<Utc>,
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for display.
    fn name(&self) -> &'static str;

    /// Create the index if it does not exist. Returns true if it was created.
    async fn ensure_index(&self, dimension: usize) -> Result<bool>;

    /// Check whether the index exists.
    async fn index_exists(&self) -> Result<bool>;

    /// Insert or replace records by ID.
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Nearest neighbours of `vector`, best first, with score >= `min_score`.
    async fn query(&self, vector: &[f32], top_k: usize, min_score: f32)
        -> Result<Vec<SearchResult>>;

    /// Delete every vector of a source document.
    async fn delete_by_source(&self, source_url: &str) -> Result<usize> {
        self.delete_stale(source_url, &[]).await
    }

    /// Delete the vectors of a source document whose IDs are not in `keep`.
    async fn delete_stale(&self, source_url: &str, keep: &[String]) -> Result<usize>;

    /// Index statistics.
    async fn stats(&self) -> Result<IndexStats>;

    /// List indexed source documents.
    async fn list_sources(&self) -> Result<Vec<IndexedSource>>;

    /// Delete the whole index.
    async fn delete_index(&self) -> Result<()>;
}

/// Create the vector store selected in settings.
pub fn create_vector_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match settings.vector_store.provider {
        VectorStoreProvider::Pinecone => {
            Arc::new(PineconeStore::from_env(&settings.vector_store.pinecone)?)
        }
        VectorStoreProvider::Sqlite => Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?),
        VectorStoreProvider::Memory => Arc::new(MemoryVectorStore::new()),
    };
    Ok(store)
}

/// Stable document ID derived from its URL.
pub fn document_id(source_url: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, source_url.as_bytes()).to_string()
}

/// Stable vector ID for one chunk of a document.
pub fn record_id(source_url: &str, chunk_index: usize) -> String {
    format!("{}{}", id_prefix(source_url), chunk_index)
}

/// Prefix shared by all vector IDs of a document.
pub fn id_prefix(source_url: &str) -> String {
    format!("{}#", document_id(source_url))
}

/// Truncate to at most `limit` characters, on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Sort best first and keep the top `limit`.
pub(crate) fn rank(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

// Pinecone returns metadata numbers as floats.
fn deserialize_count<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value.max(0.0) as usize)
}

fn deserialize_page<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|v| v.max(0.0) as u32))
}

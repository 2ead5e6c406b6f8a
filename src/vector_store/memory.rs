//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets.

use super::{
    cosine_similarity, rank, IndexStats, IndexedSource, SearchResult, VectorRecord, VectorStore,
};
use crate::error::{AdvisorError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Index {
    dimension: Option<usize>,
    records: HashMap<String, VectorRecord>,
}

/// In-memory vector store.
pub struct MemoryVectorStore {
    index: RwLock<Index>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store with no index.
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Index>> {
        self.index
            .read()
            .map_err(|e| AdvisorError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Index>> {
        self.index
            .write()
            .map_err(|e| AdvisorError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn require_dimension(index: &Index) -> Result<usize> {
    index
        .dimension
        .ok_or_else(|| AdvisorError::NotFound("Index does not exist".to_string()))
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_index(&self, dimension: usize) -> Result<bool> {
        let mut index = self.write()?;
        match index.dimension {
            Some(existing) if existing != dimension => Err(AdvisorError::VectorStore(format!(
                "Index dimension is {}, expected {}",
                existing, dimension
            ))),
            Some(_) => Ok(false),
            None => {
                index.dimension = Some(dimension);
                Ok(true)
            }
        }
    }

    async fn index_exists(&self) -> Result<bool> {
        Ok(self.read()?.dimension.is_some())
    }

    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut index = self.write()?;
        let dimension = require_dimension(&index)?;

        if let Some(bad) = records.iter().find(|r| r.values.len() != dimension) {
            return Err(AdvisorError::VectorStore(format!(
                "Vector {} has dimension {}, index expects {}",
                bad.id,
                bad.values.len(),
                dimension
            )));
        }

        for record in records {
            index.records.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let index = self.read()?;
        require_dimension(&index)?;

        let results: Vec<SearchResult> = index
            .records
            .values()
            .map(|record| SearchResult {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .filter(|r| r.score >= min_score)
            .collect();

        Ok(rank(results, top_k))
    }

    async fn delete_stale(&self, source_url: &str, keep: &[String]) -> Result<usize> {
        let mut index = self.write()?;
        let initial_len = index.records.len();
        index.records.retain(|id, record| {
            record.metadata.source_url != source_url || keep.contains(id)
        });
        Ok(initial_len - index.records.len())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let index = self.read()?;
        let dimension = require_dimension(&index)?;
        Ok(IndexStats {
            total_vector_count: index.records.len() as u64,
            dimension: Some(dimension),
            index_fullness: 0.0,
        })
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let index = self.read()?;

        let mut sources: HashMap<String, IndexedSource> = HashMap::new();
        for record in index.records.values() {
            let meta = &record.metadata;
            let entry = sources
                .entry(meta.source_url.clone())
                .or_insert_with(|| IndexedSource {
                    source_url: meta.source_url.clone(),
                    title: meta.title.clone(),
                    source_type: meta.source_type,
                    chunk_count: 0,
                    processed_at: meta.processed_at,
                });

            entry.chunk_count += 1;
            if meta.processed_at > entry.processed_at {
                entry.processed_at = meta.processed_at;
            }
        }

        let mut sources: Vec<IndexedSource> = sources.into_values().collect();
        sources.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(sources)
    }

    async fn delete_index(&self) -> Result<()> {
        let mut index = self.write()?;
        *index = Index::default();
        Ok(())
    }
}

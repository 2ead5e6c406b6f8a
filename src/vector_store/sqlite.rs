//! SQLite-based vector store implementation.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! Suitable for a local knowledge base of a few thousand chunks.

use super::{
    cosine_similarity, rank, ChunkMetadata, IndexStats, IndexedSource, SearchResult,
    VectorRecord, VectorStore,
};
use crate::error::{AdvisorError, Result};
use crate::source::SourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS vectors (
        id TEXT PRIMARY KEY,
        source_url TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        total_chunks INTEGER NOT NULL,
        source_type TEXT NOT NULL,
        page INTEGER,
        processed_at TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_vectors_source_url ON vectors(source_url);

    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

const SELECT_VECTORS: &str = r#"
    SELECT id, source_url, title, content, chunk_index, total_chunks,
           source_type, page, processed_at, embedding
    FROM vectors
"#;

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a SQLite vector store.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AdvisorError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn stored_dimension(conn: &Connection) -> Result<Option<usize>> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|v| {
                v.parse::<usize>().map_err(|e| {
                    AdvisorError::VectorStore(format!("Corrupt index dimension '{}': {}", v, e))
                })
            })
            .transpose()
    }

    fn require_dimension(conn: &Connection) -> Result<usize> {
        Self::stored_dimension(conn)?
            .ok_or_else(|| AdvisorError::NotFound("Index does not exist".to_string()))
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<VectorRecord> {
        let source_type: String = row.get(6)?;
        let processed_at: String = row.get(8)?;
        let embedding: Vec<u8> = row.get(9)?;
        let chunk_index: i64 = row.get(4)?;
        let total_chunks: i64 = row.get(5)?;

        Ok(VectorRecord {
            id: row.get(0)?,
            values: Self::bytes_to_embedding(&embedding),
            metadata: ChunkMetadata {
                source_url: row.get(1)?,
                title: row.get(2)?,
                content: row.get(3)?,
                chunk_index: chunk_index as usize,
                total_chunks: total_chunks as usize,
                source_type: source_type.parse().unwrap_or(SourceKind::Web),
                page: row.get(7)?,
                processed_at: parse_timestamp(&processed_at),
            },
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self))]
    async fn ensure_index(&self, dimension: usize) -> Result<bool> {
        let conn = self.lock()?;

        match Self::stored_dimension(&conn)? {
            Some(existing) if existing != dimension => Err(AdvisorError::VectorStore(format!(
                "Index dimension is {}, expected {}",
                existing, dimension
            ))),
            Some(_) => Ok(false),
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('dimension', ?1)",
                    params![dimension.to_string()],
                )?;
                info!("Created local index with dimension {}", dimension);
                Ok(true)
            }
        }
    }

    async fn index_exists(&self) -> Result<bool> {
        let conn = self.lock()?;
        Ok(Self::stored_dimension(&conn)?.is_some())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        let conn = self.lock()?;
        let dimension = Self::require_dimension(&conn)?;

        let tx = conn.unchecked_transaction()?;

        for record in records {
            if record.values.len() != dimension {
                return Err(AdvisorError::VectorStore(format!(
                    "Vector {} has dimension {}, index expects {}",
                    record.id,
                    record.values.len(),
                    dimension
                )));
            }

            let meta = &record.metadata;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO vectors
                (id, source_url, title, content, chunk_index, total_chunks,
                 source_type, page, processed_at, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    record.id,
                    meta.source_url,
                    meta.title,
                    meta.content,
                    meta.chunk_index as i64,
                    meta.total_chunks as i64,
                    meta.source_type.to_string(),
                    meta.page,
                    meta.processed_at.to_rfc3339(),
                    Self::embedding_to_bytes(&record.values),
                ],
            )?;
        }

        tx.commit()?;
        debug!("Batch upserted {} vectors", records.len());
        Ok(records.len())
    }

    #[instrument(skip(self, vector))]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.lock()?;
        Self::require_dimension(&conn)?;

        let mut stmt = conn.prepare(SELECT_VECTORS)?;
        let records = stmt.query_map([], Self::row_to_record)?;

        let results: Vec<SearchResult> = records
            .filter_map(|r| r.ok())
            .map(|record| SearchResult {
                score: cosine_similarity(vector, &record.values),
                id: record.id,
                metadata: record.metadata,
            })
            .filter(|r| r.score >= min_score)
            .collect();

        let results = rank(results, top_k);
        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }

    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    async fn delete_stale(&self, source_url: &str, keep: &[String]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT id FROM vectors WHERE source_url = ?1")?;
            let rows = stmt.query_map(params![source_url], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };

        let mut deleted = 0;
        for id in ids.iter().filter(|id| !keep.contains(id)) {
            deleted += tx.execute("DELETE FROM vectors WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        if deleted > 0 {
            info!("Deleted {} vectors for {}", deleted, source_url);
        }
        Ok(deleted)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let conn = self.lock()?;
        let dimension = Self::require_dimension(&conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;

        Ok(IndexStats {
            total_vector_count: count as u64,
            dimension: Some(dimension),
            index_fullness: 0.0,
        })
    }

    #[instrument(skip(self))]
    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT source_url, MAX(title), MAX(source_type), COUNT(*), MAX(processed_at)
            FROM vectors
            GROUP BY source_url
            ORDER BY MAX(processed_at) DESC
            "#,
        )?;

        let sources = stmt.query_map([], |row| {
            let source_type: String = row.get(2)?;
            let processed_at: String = row.get(4)?;
            Ok(IndexedSource {
                source_url: row.get(0)?,
                title: row.get(1)?,
                source_type: source_type.parse().unwrap_or(SourceKind::Web),
                chunk_count: row.get(3)?,
                processed_at: parse_timestamp(&processed_at),
            })
        })?;

        Ok(sources.filter_map(|s| s.ok()).collect())
    }

    async fn delete_index(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM vectors; DELETE FROM index_meta;")?;
        info!("Deleted local index");
        Ok(())
    }
}

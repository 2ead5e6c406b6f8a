//! Pipeline orchestrator for Advisor.
//!
//! Coordinates the ingestion process from fetching a document to indexing
//! its chunks, and the bookkeeping around it.

use crate::catalog::DocumentCatalog;
use crate::chunking::{chunk_document, ContentChunk, RecursiveSplitter};
use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{AdvisorError, Result};
use crate::snapshot::{self, ScrapedChunk};
use crate::source::{parse_url, DocumentSource, FetchedDocument, PdfSource, SourceKind, WebScraper};
use crate::vector_store::{create_vector_store, document_id, VectorRecord, VectorStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// The main orchestrator for the Advisor pipeline.
pub struct Orchestrator {
    settings: Settings,
    web: Arc<dyn DocumentSource>,
    pdf: Arc<dyn DocumentSource>,
    splitter: RecursiveSplitter,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    catalog: Mutex<DocumentCatalog>,
}

impl Orchestrator {
    /// Create an orchestrator from settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let web: Arc<dyn DocumentSource> = Arc::new(WebScraper::new(&settings.scraper)?);
        let pdf: Arc<dyn DocumentSource> =
            Arc::new(PdfSource::new(&settings.pdf, &settings.temp_dir())?);
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?);
        let vector_store = create_vector_store(&settings)?;

        Self::with_components(settings, web, pdf, embedder, vector_store)
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        web: Arc<dyn DocumentSource>,
        pdf: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let splitter = RecursiveSplitter::from_settings(&settings.chunking)?;
        let catalog = DocumentCatalog::load(&settings.catalog_path());

        Ok(Self {
            settings,
            web,
            pdf,
            splitter,
            embedder,
            vector_store,
            catalog: Mutex::new(catalog),
        })
    }

    /// Get a reference to the vector store.
    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.vector_store.clone()
    }

    /// Get a reference to the embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn catalog(&self) -> Result<MutexGuard<'_, DocumentCatalog>> {
        self.catalog
            .lock()
            .map_err(|e| AdvisorError::Catalog(format!("Failed to acquire lock: {}", e)))
    }

    /// Validate a URL and pick the source that serves it.
    pub fn resolve_source(&self, input: &str) -> Result<(Url, Arc<dyn DocumentSource>)> {
        let url = parse_url(input)?;
        let source = self.source_for(&url)?;
        Ok((url, source))
    }

    fn source_for(&self, url: &Url) -> Result<Arc<dyn DocumentSource>> {
        if self.pdf.can_handle(url) {
            Ok(self.pdf.clone())
        } else if self.web.can_handle(url) {
            Ok(self.web.clone())
        } else {
            Err(AdvisorError::InvalidInput(format!(
                "No source can handle {}",
                url
            )))
        }
    }

    async fn fetch(&self, url: &Url, title: Option<&str>) -> Result<FetchedDocument> {
        let doc = self.source_for(url)?.fetch(url, title).await?;

        if doc.is_empty() {
            return Err(AdvisorError::Extraction(format!(
                "No text content extracted from {}",
                url
            )));
        }

        debug!(
            "Fetched {} ({} pages, {} chars)",
            doc.title,
            doc.pages.len(),
            doc.text_len()
        );
        Ok(doc)
    }

    fn split(&self, doc: &FetchedDocument) -> Result<Vec<ContentChunk>> {
        let chunks = chunk_document(doc, &self.splitter);
        if chunks.is_empty() {
            return Err(AdvisorError::Chunking(format!(
                "No chunks produced for {}",
                doc.url
            )));
        }
        info!("Created {} chunks from {}", chunks.len(), doc.url);
        Ok(chunks)
    }

    /// Embed chunks in batches of `embedding.batch_size`. When a batch fails,
    /// only that batch is retried one chunk at a time; chunks that still fail
    /// are dropped.
    async fn embed_chunks(&self, chunks: Vec<ContentChunk>) -> Vec<(ContentChunk, Vec<f32>)> {
        let delay = Duration::from_millis(self.settings.embedding.request_delay_ms);
        let batch_size = self.settings.embedding.batch_size.max(1);
        let total = chunks.len();
        let mut embedded = Vec::with_capacity(total);

        for (batch_idx, batch) in chunks.chunks(batch_size).enumerate() {
            if batch_idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            match self.embedder.embed_batch(&texts).await {
                Ok(embeddings) if embeddings.len() == batch.len() => {
                    embedded.extend(batch.iter().cloned().zip(embeddings));
                    continue;
                }
                Ok(embeddings) => warn!(
                    "Embedding batch {} returned {} vectors for {} chunks, retrying one by one",
                    batch_idx + 1,
                    embeddings.len(),
                    batch.len()
                ),
                Err(e) => warn!(
                    "Embedding batch {} failed, retrying one by one: {}",
                    batch_idx + 1,
                    e
                ),
            }

            for chunk in batch {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match self.embedder.embed(&chunk.content).await {
                    Ok(embedding) => embedded.push((chunk.clone(), embedding)),
                    Err(e) => warn!(
                        "Skipping chunk {} of {}: {}",
                        chunk.chunk_index, chunk.source_url, e
                    ),
                }
            }
        }

        if embedded.len() < total {
            warn!("Embedded {} of {} chunks", embedded.len(), total);
        }
        embedded
    }

    /// Scrape URLs into embedded chunks without indexing them.
    ///
    /// A URL that fails is logged and skipped.
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn scrape(&self, urls: &[String]) -> Result<Vec<ScrapedChunk>> {
        let delay = Duration::from_millis(self.settings.scraper.request_delay_ms);
        let mut all_chunks = Vec::new();

        for (i, url) in urls.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.scrape_one(url).await {
                Ok(chunks) => {
                    info!("Scraped {} chunks from {}", chunks.len(), url);
                    all_chunks.extend(chunks);
                }
                Err(e) => warn!("Failed to scrape {}: {}", url, e),
            }
        }

        Ok(all_chunks)
    }

    async fn scrape_one(&self, input: &str) -> Result<Vec<ScrapedChunk>> {
        let url = parse_url(input)?;
        let doc = self.fetch(&url, None).await?;
        let chunks = self.split(&doc)?;
        let embedded = self.embed_chunks(chunks).await;

        Ok(embedded
            .into_iter()
            .map(|(chunk, embedding)| ScrapedChunk::new(chunk, doc.kind, embedding, doc.fetched_at))
            .collect())
    }

    /// Fetch, chunk, embed and index one document, recording the outcome in
    /// the catalog.
    ///
    /// The URL is normalized first, so spelling variants of one address
    /// share a catalog entry and vector IDs. Documents already in the
    /// catalog are skipped unless `force` is set.
    #[instrument(skip(self, title), fields(url = %input))]
    pub async fn process_document(
        &self,
        input: &str,
        title: Option<&str>,
        force: bool,
    ) -> Result<ProcessResult> {
        let url = parse_url(input)?;
        let key = url.as_str();

        if !force {
            let catalog = self.catalog()?;
            if let Some(entry) = catalog.get(key).filter(|e| e.success) {
                info!("{} is already processed, skipping", key);
                return Ok(ProcessResult {
                    document_id: document_id(key),
                    url: key.to_string(),
                    title: entry.title.clone(),
                    kind: None,
                    chunks_indexed: entry.chunks_count,
                    skipped: true,
                });
            }
        }

        let result = self.index_document(&url, title).await;

        let record = match &result {
            Ok(r) => self.record(key, &r.title, r.chunks_indexed, true),
            Err(_) => self.record(key, title.unwrap_or(key), 0, false),
        };
        if let Err(e) = record {
            warn!("Failed to update catalog: {}", e);
        }

        result
    }

    fn record(&self, url: &str, title: &str, chunks: usize, success: bool) -> Result<()> {
        self.catalog()?.add(url, title, chunks, success)
    }

    async fn index_document(&self, url: &Url, title: Option<&str>) -> Result<ProcessResult> {
        let doc = self.fetch(url, title).await?;
        let chunks = self.split(&doc)?;

        let embedded = self.embed_chunks(chunks).await;
        if embedded.is_empty() {
            return Err(AdvisorError::Embedding(format!(
                "No chunks of {} could be embedded",
                doc.url
            )));
        }

        let dimensions = self.settings.embedding.dimensions as usize;
        if self.vector_store.ensure_index(dimensions).await? {
            info!("Created index with dimension {}", dimensions);
        }

        let limit = self.settings.vector_store.metadata_content_limit;
        let records: Vec<VectorRecord> = embedded
            .iter()
            .map(|(chunk, embedding)| {
                VectorRecord::from_chunk(chunk, doc.kind, embedding.clone(), limit)
            })
            .collect();

        // Upsert before pruning: a failed write must leave the previous
        // version of the document in the index.
        let indexed = self.vector_store.upsert_batch(&records).await?;
        info!("Indexed {} chunks from {}", indexed, doc.url);

        let current: Vec<String> = records.into_iter().map(|r| r.id).collect();
        let removed = self.vector_store.delete_stale(&doc.url, &current).await?;
        if removed > 0 {
            debug!("Removed {} stale vectors for {}", removed, doc.url);
        }

        Ok(ProcessResult {
            document_id: document_id(&doc.url),
            url: doc.url,
            title: doc.title,
            kind: Some(doc.kind),
            chunks_indexed: indexed,
            skipped: false,
        })
    }

    /// Process a list of documents. One document's failure never aborts the
    /// batch.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn process_batch(&self, requests: &[DocumentRequest], force: bool) -> BatchReport {
        let delay = Duration::from_millis(self.settings.scraper.request_delay_ms);
        let mut report = BatchReport::default();

        for (i, request) in requests.iter().enumerate() {
            let title = request
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("Document {}", i + 1));

            info!("[{}/{}] {}", i + 1, requests.len(), request.url);

            let key = parse_url(&request.url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| request.url.clone());
            let already = !force
                && self
                    .catalog()
                    .map(|c| c.is_processed(&key))
                    .unwrap_or(false);
            if already {
                report.skipped += 1;
                report.details.push(BatchDetail {
                    url: request.url.clone(),
                    title,
                    status: BatchStatus::Skipped,
                    chunks: 0,
                    error: None,
                });
                continue;
            }

            if report.processed + report.failed > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.process_document(&request.url, Some(&title), true).await {
                Ok(result) => {
                    report.processed += 1;
                    report.details.push(BatchDetail {
                        url: request.url.clone(),
                        title: result.title,
                        status: BatchStatus::Processed,
                        chunks: result.chunks_indexed,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", request.url, e);
                    report.failed += 1;
                    report.details.push(BatchDetail {
                        url: request.url.clone(),
                        title,
                        status: BatchStatus::Failed,
                        chunks: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            "Batch complete: {} processed, {} skipped, {} failed",
            report.processed, report.skipped, report.failed
        );
        report
    }

    /// Upload a snapshot written by `scrape` to the vector store.
    #[instrument(skip(self))]
    pub async fn upload_snapshot(&self, path: &Path) -> Result<usize> {
        let chunks = snapshot::load(path)?;
        if chunks.is_empty() {
            warn!("Snapshot {:?} has no chunks", path);
            return Ok(0);
        }

        self.vector_store
            .ensure_index(self.settings.embedding.dimensions as usize)
            .await?;

        let records = snapshot::to_vector_records(
            &chunks,
            self.settings.vector_store.metadata_content_limit,
        );
        self.vector_store.upsert_batch(&records).await
    }

    /// Number of documents the catalog lists as successfully processed.
    pub fn processed_document_count(&self) -> usize {
        self.catalog()
            .map(|c| c.processed_documents().len())
            .unwrap_or(0)
    }

    /// Check whether the knowledge base can answer questions.
    pub async fn knowledge_base_status(&self) -> Result<KnowledgeBaseStatus> {
        knowledge_base_status(self.vector_store.as_ref()).await
    }
}

/// Readiness of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeBaseStatus {
    /// Index exists and holds this many vectors.
    Ready(u64),
    /// Index exists but is empty.
    Empty,
    /// Index does not exist.
    Missing,
}

/// Check whether a vector store holds any content.
pub async fn knowledge_base_status(store: &dyn VectorStore) -> Result<KnowledgeBaseStatus> {
    if !store.index_exists().await? {
        return Ok(KnowledgeBaseStatus::Missing);
    }

    let stats = store.stats().await?;
    if stats.total_vector_count > 0 {
        Ok(KnowledgeBaseStatus::Ready(stats.total_vector_count))
    } else {
        Ok(KnowledgeBaseStatus::Empty)
    }
}

/// Result of processing one document.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Stable ID derived from the URL.
    pub document_id: String,
    pub url: String,
    pub title: String,
    /// Source type, unknown when processing was skipped.
    pub kind: Option<SourceKind>,
    /// Number of chunks indexed.
    pub chunks_indexed: usize,
    /// Whether processing was skipped (already in the catalog).
    pub skipped: bool,
}

/// One entry of a batch ingestion list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequestList {
    Bare(Vec<DocumentRequest>),
    Wrapped { documents: Vec<DocumentRequest> },
}

impl RequestList {
    fn into_requests(self) -> Vec<DocumentRequest> {
        match self {
            RequestList::Bare(requests) => requests,
            RequestList::Wrapped { documents } => documents,
        }
    }
}

/// Read a batch list from JSON (an array or `{"documents": [...]}`) or TOML
/// (`[[documents]]` tables).
pub fn load_requests(path: &Path) -> Result<Vec<DocumentRequest>> {
    let content = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let list: RequestList = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };

    let requests = list.into_requests();
    if requests.is_empty() {
        return Err(AdvisorError::InvalidInput(format!(
            "No documents listed in {}",
            path.display()
        )));
    }
    Ok(requests)
}

/// Outcome of one document in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchDetail {
    pub url: String,
    pub title: String,
    pub status: BatchStatus,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub details: Vec<BatchDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::{record_id, IndexStats, IndexedSource, MemoryVectorStore, SearchResult};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Serves canned documents keyed by URL.
    struct FakeSource {
        kind: SourceKind,
        pages: HashMap<String, Vec<String>>,
    }

    impl FakeSource {
        fn new(kind: SourceKind, docs: &[(&str, &[&str])]) -> Self {
            Self {
                kind,
                pages: docs
                    .iter()
                    .map(|(url, pages)| {
                        (url.to_string(), pages.iter().map(|p| p.to_string()).collect())
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl DocumentSource for FakeSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn can_handle(&self, url: &Url) -> bool {
            crate::source::detect_kind(url) == self.kind
        }

        async fn fetch(&self, url: &Url, title: Option<&str>) -> Result<FetchedDocument> {
            let pages = self
                .pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| AdvisorError::Fetch(format!("{}: 404 Not Found", url)))?;

            Ok(FetchedDocument {
                url: url.to_string(),
                title: title.unwrap_or("Fetched Title").to_string(),
                kind: self.kind,
                pages,
                fetched_at: Utc::now(),
            })
        }
    }

    /// Embeds text as a 3-d vector; any text containing "FAIL" is rejected.
    #[derive(Default)]
    struct FakeEmbedder {
        batch_calls: AtomicUsize,
        single_calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("FAIL") {
                return Err(AdvisorError::Embedding("rejected".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("FAIL")) {
                return Err(AdvisorError::Embedding("batch rejected".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    const PAGE_URL: &str = "https://example.com/advising";
    const PDF_URL: &str = "https://example.com/catalog.pdf";

    fn settings(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.catalog.path = dir.join("catalog.json").display().to_string();
        settings.scraper.request_delay_ms = 0;
        settings.embedding.request_delay_ms = 0;
        settings.embedding.dimensions = 3;
        settings.chunking.chunk_size = 40;
        settings.chunking.chunk_overlap = 0;
        settings
    }

    /// Memory store whose upserts can be switched to fail.
    struct FlakyStore {
        inner: MemoryVectorStore,
        fail_upserts: AtomicBool,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn ensure_index(&self, dimension: usize) -> Result<bool> {
            self.inner.ensure_index(dimension).await
        }

        async fn index_exists(&self) -> Result<bool> {
            self.inner.index_exists().await
        }

        async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(AdvisorError::VectorStore("upsert rejected".to_string()));
            }
            self.inner.upsert_batch(records).await
        }

        async fn query(&self, vector: &[f32], top_k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
            self.inner.query(vector, top_k, min_score).await
        }

        async fn delete_stale(&self, source_url: &str, keep: &[String]) -> Result<usize> {
            self.inner.delete_stale(source_url, keep).await
        }

        async fn stats(&self) -> Result<IndexStats> {
            self.inner.stats().await
        }

        async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
            self.inner.list_sources().await
        }

        async fn delete_index(&self) -> Result<()> {
            self.inner.delete_index().await
        }
    }

    fn orchestrator(dir: &Path) -> (Orchestrator, Arc<MemoryVectorStore>) {
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = build(settings(dir), Arc::new(FakeEmbedder::default()), store.clone());
        (orchestrator, store)
    }

    fn build(settings: Settings, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Orchestrator {
        let web = FakeSource::new(
            SourceKind::Web,
            &[
                (PAGE_URL, &["Advising appointments are available every weekday."]),
                ("https://example.com/empty", &["   "]),
                (
                    "https://example.com/partial",
                    &["Good paragraph here.\n\nFAIL paragraph here."],
                ),
                ("https://example.com/broken", &["FAIL"]),
                ("https://example.com/", &["Welcome to the advising center."]),
                (
                    "https://example.com/sections",
                    &[
                        "Alpha section text.",
                        "Beta section text.",
                        "Gamma section text.",
                        "FAIL section text.",
                        "Epsilon section text.",
                    ],
                ),
            ],
        );
        let pdf = FakeSource::new(
            SourceKind::Pdf,
            &[(PDF_URL, &["ECON 2105 Macroeconomics.", "ECON 2106 Microeconomics."])],
        );

        Orchestrator::with_components(settings, Arc::new(web), Arc::new(pdf), embedder, store).unwrap()
    }

    #[tokio::test]
    async fn test_process_document_indexes_and_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, store) = orchestrator(dir.path());

        let result = orchestrator
            .process_document(PDF_URL, Some("Undergraduate Catalog"), false)
            .await
            .unwrap();

        assert!(!result.skipped);
        assert_eq!(result.kind, Some(SourceKind::Pdf));
        assert_eq!(result.chunks_indexed, 2);
        assert_eq!(result.document_id, document_id(PDF_URL));
        assert_eq!(store.stats().await.unwrap().total_vector_count, 2);

        let sources = store.list_sources().await.unwrap();
        assert_eq!(sources[0].title, "Undergraduate Catalog");

        let catalog = DocumentCatalog::load(&dir.path().join("catalog.json"));
        assert!(catalog.is_processed(PDF_URL));
        assert_eq!(catalog.documents[0].chunks_count, 2);
    }

    #[tokio::test]
    async fn test_reprocessing_skips_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, store) = orchestrator(dir.path());

        orchestrator.process_document(PAGE_URL, None, false).await.unwrap();
        let again = orchestrator.process_document(PAGE_URL, None, false).await.unwrap();
        assert!(again.skipped);

        let forced = orchestrator.process_document(PAGE_URL, None, true).await.unwrap();
        assert!(!forced.skipped);
        // Same IDs, so vectors are replaced rather than duplicated.
        assert_eq!(
            store.stats().await.unwrap().total_vector_count as usize,
            forced.chunks_indexed
        );
    }

    #[tokio::test]
    async fn test_failed_reingest_keeps_previous_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore {
            inner: MemoryVectorStore::new(),
            fail_upserts: AtomicBool::new(false),
        });
        let orchestrator = build(settings(dir.path()), Arc::new(FakeEmbedder::default()), store.clone());

        let first = orchestrator.process_document(PDF_URL, None, false).await.unwrap();
        assert_eq!(first.chunks_indexed, 2);

        store.fail_upserts.store(true, Ordering::SeqCst);
        let again = orchestrator.process_document(PDF_URL, None, true).await;
        assert!(matches!(again, Err(AdvisorError::VectorStore(_))));
        assert_eq!(store.stats().await.unwrap().total_vector_count, 2);
    }

    #[tokio::test]
    async fn test_reingest_prunes_vectors_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, store) = orchestrator(dir.path());

        orchestrator.process_document(PDF_URL, None, false).await.unwrap();

        // A leftover from a longer earlier version of the document.
        let mut stale = store.query(&[1.0, 1.0, 0.0], 1, -1.0).await.unwrap()[0].clone();
        stale.metadata.chunk_index = 7;
        let record = VectorRecord {
            id: record_id(PDF_URL, 7),
            values: vec![1.0, 1.0, 0.0],
            metadata: stale.metadata,
        };
        store.upsert_batch(&[record]).await.unwrap();
        assert_eq!(store.stats().await.unwrap().total_vector_count, 3);

        orchestrator.process_document(PDF_URL, None, true).await.unwrap();
        assert_eq!(store.stats().await.unwrap().total_vector_count, 2);
    }

    #[tokio::test]
    async fn test_only_failed_embedding_batch_is_retried_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.embedding.batch_size = 2;
        let embedder = Arc::new(FakeEmbedder::default());
        let orchestrator = build(settings, embedder.clone(), Arc::new(MemoryVectorStore::new()));

        let result = orchestrator
            .process_document("https://example.com/sections", None, false)
            .await
            .unwrap();

        assert_eq!(result.chunks_indexed, 4);
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 3);
        assert_eq!(embedder.single_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_url_spellings_share_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _store) = orchestrator(dir.path());

        let first = orchestrator
            .process_document("https://Example.com", None, false)
            .await
            .unwrap();
        assert!(!first.skipped);
        assert_eq!(first.url, "https://example.com/");

        let second = orchestrator
            .process_document("https://example.com/", None, false)
            .await
            .unwrap();
        assert!(second.skipped);
        assert_eq!(second.document_id, first.document_id);

        let report = orchestrator
            .process_batch(
                &[DocumentRequest {
                    url: "HTTPS://EXAMPLE.COM".to_string(),
                    title: None,
                }],
                false,
            )
            .await;
        assert_eq!(report.skipped, 1);

        let catalog = DocumentCatalog::load(&dir.path().join("catalog.json"));
        assert_eq!(catalog.documents.len(), 1);
        assert!(catalog.is_processed("https://example.com/"));
    }

    #[tokio::test]
    async fn test_failed_chunks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, store) = orchestrator(dir.path());

        let result = orchestrator
            .process_document("https://example.com/partial", None, false)
            .await
            .unwrap();
        assert_eq!(result.chunks_indexed, 1);

        let hits = store.query(&[1.0, 0.0, 0.0], 10, -1.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.content, "Good paragraph here.");
    }

    #[tokio::test]
    async fn test_process_document_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _store) = orchestrator(dir.path());

        let empty = orchestrator
            .process_document("https://example.com/empty", None, false)
            .await;
        assert!(matches!(empty, Err(AdvisorError::Extraction(_))));

        let broken = orchestrator
            .process_document("https://example.com/broken", None, false)
            .await;
        assert!(matches!(broken, Err(AdvisorError::Embedding(_))));

        let invalid = orchestrator.process_document("ftp://example.com", None, false).await;
        assert!(matches!(invalid, Err(AdvisorError::InvalidInput(_))));

        let catalog = DocumentCatalog::load(&dir.path().join("catalog.json"));
        let summary = catalog.summary();
        assert_eq!(summary.successful_documents, 0);
        assert!(summary.failed_documents >= 2);
    }

    #[tokio::test]
    async fn test_process_batch_reports_each_document() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _store) = orchestrator(dir.path());

        orchestrator.process_document(PAGE_URL, None, false).await.unwrap();

        let requests = vec![
            DocumentRequest {
                url: PAGE_URL.to_string(),
                title: None,
            },
            DocumentRequest {
                url: PDF_URL.to_string(),
                title: None,
            },
            DocumentRequest {
                url: "https://example.com/missing".to_string(),
                title: Some("Missing".to_string()),
            },
        ];

        let report = orchestrator.process_batch(&requests, false).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);

        assert_eq!(report.details[0].status, BatchStatus::Skipped);
        assert_eq!(report.details[1].status, BatchStatus::Processed);
        assert_eq!(report.details[1].title, "Document 2");
        assert_eq!(report.details[2].status, BatchStatus::Failed);
        assert!(report.details[2].error.as_deref().unwrap().contains("404"));

        let forced = orchestrator.process_batch(&requests[..1], true).await;
        assert_eq!(forced.processed, 1);
    }

    #[tokio::test]
    async fn test_scrape_and_upload_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, store) = orchestrator(dir.path());

        let urls = vec![
            PAGE_URL.to_string(),
            "https://example.com/missing".to_string(),
            PDF_URL.to_string(),
        ];
        let chunks = orchestrator.scrape(&urls).await.unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].title, "Fetched Title");
        assert_eq!(chunks[2].source_type, SourceKind::Pdf);
        assert_eq!(chunks[3].page, Some(2));

        assert_eq!(
            orchestrator.knowledge_base_status().await.unwrap(),
            KnowledgeBaseStatus::Missing
        );

        let path = dir.path().join("scraped_data.json");
        snapshot::save(&path, &chunks).unwrap();
        let uploaded = orchestrator.upload_snapshot(&path).await.unwrap();
        assert_eq!(uploaded, 4);

        assert_eq!(store.stats().await.unwrap().total_vector_count, 4);
        assert_eq!(
            orchestrator.knowledge_base_status().await.unwrap(),
            KnowledgeBaseStatus::Ready(4)
        );
    }

    #[tokio::test]
    async fn test_empty_index_status() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, store) = orchestrator(dir.path());
        store.ensure_index(3).await.unwrap();

        assert_eq!(
            orchestrator.knowledge_base_status().await.unwrap(),
            KnowledgeBaseStatus::Empty
        );
    }

    #[test]
    fn test_load_requests_formats() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("docs.json");
        std::fs::write(
            &json,
            r#"[{"url": "https://example.com/a.pdf", "title": "A"}, {"url": "https://example.com/b"}]"#,
        )
        .unwrap();
        let requests = load_requests(&json).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].title, None);

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"documents": [{"url": "https://example.com/a.pdf"}]}"#)
            .unwrap();
        assert_eq!(load_requests(&wrapped).unwrap().len(), 1);

        let toml_path = dir.path().join("docs.toml");
        std::fs::write(
            &toml_path,
            "[[documents]]\nurl = \"https://example.com/a.pdf\"\ntitle = \"A\"\n",
        )
        .unwrap();
        let requests = load_requests(&toml_path).unwrap();
        assert_eq!(requests[0].title.as_deref(), Some("A"));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();
        assert!(load_requests(&empty).is_err());
    }
}

//! Pinecone vector store over the REST API.
//!
//! Index management goes through the control plane; reads and writes go to
//! the index host, which is resolved once and cached.

use super::{id_prefix, ChunkMetadata, IndexStats, IndexedSource, SearchResult, VectorRecord, VectorStore};
use crate::config::PineconeSettings;
use crate::error::{AdvisorError, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const API_KEY_ENV: &str = "PINECONE_API_KEY";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const LIST_PAGE_LIMIT: usize = 100;

/// Pinecone-backed vector store.
pub struct PineconeStore {
    client: reqwest::Client,
    api_key: String,
    settings: PineconeSettings,
    host: RwLock<Option<String>>,
}

impl PineconeStore {
    /// Create a store with the API key from `PINECONE_API_KEY`.
    pub fn from_env(settings: &PineconeSettings) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        Self::new(&api_key, settings)
    }

    /// Create a store with an explicit API key.
    pub fn new(api_key: &str, settings: &PineconeSettings) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AdvisorError::Config(format!("{} is not set", API_KEY_ENV)));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            host: RwLock::new(settings.host.as_deref().map(normalize_host)),
            settings: settings.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.settings.index_name
    }

    fn control_url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.settings.control_plane_url.trim_end_matches('/'),
            path
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.settings.api_version)
    }

    /// Send a request, retrying rate limits, server errors and transport
    /// failures with a fixed delay.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let delay = Duration::from_millis(self.settings.retry_delay_ms);
        let mut attempt = 0usize;

        loop {
            let current = request.try_clone().ok_or_else(|| {
                AdvisorError::VectorStore("Request body cannot be retried".to_string())
            })?;

            match current.send().await {
                Ok(response) => {
                    let status = response.status();
                    if should_retry(status) && attempt < self.settings.max_retries {
                        attempt += 1;
                        warn!(
                            "Pinecone returned {}, retrying ({}/{})",
                            status, attempt, self.settings.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if (e.is_connect() || e.is_timeout()) && attempt < self.settings.max_retries {
                        attempt += 1;
                        warn!(
                            "Pinecone request failed: {}, retrying ({}/{})",
                            e, attempt, self.settings.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AdvisorError::VectorStore(format!(
                        "Pinecone request failed: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Send and require a 2xx response.
    async fn send_ok(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.send(request).await?;
        check_status(response).await
    }

    async fn describe_index(&self) -> Result<Option<IndexDescription>> {
        let url = self.control_url(&format!("/indexes/{}", self.settings.index_name));
        let response = self.send(self.request(Method::GET, &url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let description = check_status(response).await?.json().await?;
        Ok(Some(description))
    }

    async fn create_index(&self, dimension: usize) -> Result<()> {
        let body = CreateIndexRequest {
            name: &self.settings.index_name,
            dimension,
            metric: &self.settings.metric,
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: &self.settings.cloud,
                    region: &self.settings.region,
                },
            },
        };

        let url = self.control_url("/indexes");
        let response = self
            .send(self.request(Method::POST, &url).json(&body))
            .await?;

        if response.status() == StatusCode::CONFLICT {
            debug!("Index {} already exists", self.settings.index_name);
            return Ok(());
        }
        check_status(response).await?;

        info!(
            "Created index {} ({} dims, {}, {}/{})",
            self.settings.index_name,
            dimension,
            self.settings.metric,
            self.settings.cloud,
            self.settings.region
        );
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<IndexDescription> {
        let deadline = Instant::now() + Duration::from_secs(self.settings.ready_timeout_seconds);

        loop {
            if let Some(description) = self.describe_index().await? {
                if description.is_ready() {
                    return Ok(description);
                }
            }

            if Instant::now() >= deadline {
                return Err(AdvisorError::VectorStore(format!(
                    "Index {} not ready after {}s",
                    self.settings.index_name, self.settings.ready_timeout_seconds
                )));
            }

            debug!("Waiting for index {} to become ready", self.settings.index_name);
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Data plane base URL, resolved through the control plane on first use.
    async fn index_host(&self) -> Result<String> {
        if let Some(host) = self.cached_host()? {
            return Ok(host);
        }

        let description = self.describe_index().await?.ok_or_else(|| {
            AdvisorError::NotFound(format!("Index {} does not exist", self.settings.index_name))
        })?;
        let host = description.host.as_deref().map(normalize_host).ok_or_else(|| {
            AdvisorError::VectorStore(format!(
                "Index {} has no host yet",
                self.settings.index_name
            ))
        })?;

        self.cache_host(Some(host.clone()))?;
        Ok(host)
    }

    fn cached_host(&self) -> Result<Option<String>> {
        self.host
            .read()
            .map(|h| h.clone())
            .map_err(|e| AdvisorError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn cache_host(&self, host: Option<String>) -> Result<()> {
        let mut cached = self
            .host
            .write()
            .map_err(|e| AdvisorError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        *cached = host;
        Ok(())
    }

    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>> {
        let host = self.index_host().await?;
        let url = format!("{}/vectors/list", host);
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("prefix", prefix.to_string()),
                ("limit", LIST_PAGE_LIMIT.to_string()),
            ];
            if !self.settings.namespace.is_empty() {
                query.push(("namespace", self.settings.namespace.clone()));
            }
            if let Some(t) = &token {
                query.push(("paginationToken", t.clone()));
            }

            let page: ListResponse = self
                .send_ok(self.request(Method::GET, &url).query(&query))
                .await?
                .json()
                .await?;

            ids.extend(page.vectors.into_iter().map(|v| v.id));
            token = page.pagination.and_then(|p| p.next);
            if token.is_none() {
                break;
            }
        }

        Ok(ids)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &'static str {
        "pinecone"
    }

    #[instrument(skip(self), fields(index = %self.settings.index_name))]
    async fn ensure_index(&self, dimension: usize) -> Result<bool> {
        if let Some(description) = self.describe_index().await? {
            if let Some(existing) = description.dimension {
                if existing != dimension {
                    return Err(AdvisorError::VectorStore(format!(
                        "Index {} has dimension {}, expected {}",
                        self.settings.index_name, existing, dimension
                    )));
                }
            }
            if !description.is_ready() {
                self.wait_until_ready().await?;
            }
            debug!("Index {} already exists", self.settings.index_name);
            return Ok(false);
        }

        self.create_index(dimension).await?;
        let description = self.wait_until_ready().await?;
        if self.settings.host.is_none() {
            self.cache_host(description.host.as_deref().map(normalize_host))?;
        }
        Ok(true)
    }

    async fn index_exists(&self) -> Result<bool> {
        Ok(self.describe_index().await?.is_some())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let host = self.index_host().await?;
        let url = format!("{}/vectors/upsert", host);
        let batch_size = self.settings.upsert_batch_size.max(1);
        let delay = Duration::from_millis(self.settings.batch_delay_ms);
        let mut upserted = 0usize;

        for (batch_idx, batch) in records.chunks(batch_size).enumerate() {
            if batch_idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let body = UpsertRequest {
                vectors: batch,
                namespace: &self.settings.namespace,
            };
            let response: UpsertResponse = self
                .send_ok(self.request(Method::POST, &url).json(&body))
                .await?
                .json()
                .await?;

            upserted += response.upserted_count.unwrap_or(batch.len());
            debug!("Upserted batch {} ({} vectors)", batch_idx + 1, batch.len());
        }

        info!("Upserted {} vectors to {}", upserted, self.settings.index_name);
        Ok(upserted)
    }

    #[instrument(skip(self, vector))]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let host = self.index_host().await?;
        let url = format!("{}/query", host);
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.settings.namespace,
        };

        let response: QueryResponse = self
            .send_ok(self.request(Method::POST, &url).json(&body))
            .await?
            .json()
            .await?;

        let results = response.into_results(min_score);
        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }

    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    async fn delete_stale(&self, source_url: &str, keep: &[String]) -> Result<usize> {
        let ids: Vec<String> = self
            .list_ids(&id_prefix(source_url))
            .await?
            .into_iter()
            .filter(|id| !keep.contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let host = self.index_host().await?;
        let url = format!("{}/vectors/delete", host);
        for batch in ids.chunks(1000) {
            let body = DeleteRequest {
                ids: batch,
                namespace: &self.settings.namespace,
            };
            self.send_ok(self.request(Method::POST, &url).json(&body))
                .await?;
        }

        info!("Deleted {} vectors for {}", ids.len(), source_url);
        Ok(ids.len())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let host = self.index_host().await?;
        let url = format!("{}/describe_index_stats", host);

        let response: StatsResponse = self
            .send_ok(self.request(Method::POST, &url).json(&serde_json::json!({})))
            .await?
            .json()
            .await?;

        Ok(IndexStats {
            total_vector_count: response.total_vector_count,
            dimension: response.dimension,
            index_fullness: response.index_fullness,
        })
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        Err(AdvisorError::VectorStore(
            "Pinecone does not support listing sources; use the document catalog".to_string(),
        ))
    }

    #[instrument(skip(self), fields(index = %self.settings.index_name))]
    async fn delete_index(&self) -> Result<()> {
        let url = self.control_url(&format!("/indexes/{}", self.settings.index_name));
        let response = self.send(self.request(Method::DELETE, &url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AdvisorError::NotFound(format!(
                "Index {} does not exist",
                self.settings.index_name
            )));
        }
        check_status(response).await?;

        if self.settings.host.is_none() {
            self.cache_host(None)?;
        }
        info!("Deleted index {}", self.settings.index_name);
        Ok(())
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());

    if status == StatusCode::NOT_FOUND {
        return Err(AdvisorError::NotFound(format!("Pinecone: {}", body)));
    }
    Err(AdvisorError::VectorStore(format!(
        "Pinecone request failed ({}): {}",
        status, body
    )))
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

impl IndexDescription {
    fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: Option<usize>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
    #[serde(rename = "includeValues")]
    include_values: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl QueryResponse {
    /// Convert matches to results, dropping low scores and foreign metadata.
    fn into_results(self, min_score: f32) -> Vec<SearchResult> {
        let results: Vec<SearchResult> = self
            .matches
            .into_iter()
            .filter(|m| m.score >= min_score)
            .filter_map(|m| {
                let metadata = m.metadata?;
                match serde_json::from_value::<ChunkMetadata>(metadata) {
                    Ok(metadata) => Some(SearchResult {
                        id: m.id,
                        score: m.score,
                        metadata,
                    }),
                    Err(e) => {
                        warn!("Skipping match {} with unreadable metadata: {}", m.id, e);
                        None
                    }
                }
            })
            .collect();

        let limit = results.len();
        super::rank(results, limit)
    }
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(rename = "totalVectorCount", default)]
    total_vector_count: u64,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(rename = "indexFullness", default)]
    index_fullness: f32,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;
    use crate::vector_store::record_id;
    use axum::extract::{Query, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_requires_api_key() {
        let result = PineconeStore::new("  ", &PineconeSettings::default());
        assert!(matches!(result, Err(AdvisorError::Config(_))));
        assert!(PineconeStore::new("pc-test", &PineconeSettings::default()).is_ok());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("ai-advisor-index-abc123.svc.aped-4627-b74a.pinecone.io"),
            "https://ai-advisor-index-abc123.svc.aped-4627-b74a.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
        assert!(!should_retry(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_create_index_request_shape() {
        let body = CreateIndexRequest {
            name: "ai-advisor-index",
            dimension: 3072,
            metric: "cosine",
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: "aws",
                    region: "us-east-1",
                },
            },
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["dimension"], 3072);
        assert_eq!(value["spec"]["serverless"]["cloud"], "aws");
        assert_eq!(value["spec"]["serverless"]["region"], "us-east-1");
    }

    #[test]
    fn test_query_request_shape() {
        let vector = [0.1f32, 0.2];
        let body = QueryRequest {
            vector: &vector,
            top_k: 4,
            include_metadata: true,
            include_values: false,
            namespace: "",
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["topK"], 4);
        assert_eq!(value["includeMetadata"], true);
        assert!(value.get("namespace").is_none());
    }

    #[test]
    fn test_upsert_request_shape() {
        let record = VectorRecord {
            id: "doc#0".to_string(),
            values: vec![0.5, 0.5],
            metadata: ChunkMetadata {
                source_url: "https://example.com".to_string(),
                title: "Example".to_string(),
                content: "text".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                source_type: SourceKind::Web,
                page: None,
                processed_at: Utc::now(),
            },
        };

        let records = [record];
        let body = UpsertRequest {
            vectors: &records,
            namespace: "advising",
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["namespace"], "advising");
        assert_eq!(value["vectors"][0]["id"], "doc#0");
        assert_eq!(value["vectors"][0]["metadata"]["source_type"], "web");
    }

    #[test]
    fn test_query_response_parsing() {
        let json = r#"{
            "matches": [
                {
                    "id": "a#0",
                    "score": 0.42,
                    "metadata": {
                        "source_url": "https://example.com/a",
                        "title": "A",
                        "content": "low",
                        "chunk_index": 0.0,
                        "total_chunks": 2.0,
                        "source_type": "web",
                        "processed_at": "2024-05-01T12:00:00Z"
                    }
                },
                {
                    "id": "b#1",
                    "score": 0.91,
                    "metadata": {
                        "source_url": "https://example.com/b.pdf",
                        "title": "B",
                        "content": "high",
                        "chunk_index": 1.0,
                        "total_chunks": 3.0,
                        "source_type": "pdf",
                        "page": 2.0,
                        "processed_at": "2024-05-01T12:00:00Z"
                    }
                },
                { "id": "foreign", "score": 0.99, "metadata": { "text": "other tool" } },
                { "id": "bare", "score": 0.95 }
            ],
            "namespace": ""
        }"#;

        let response: QueryResponse = serde_json::from_str(json).unwrap();
        let results = response.into_results(0.0);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "b#1");
        assert_eq!(results[0].metadata.page, Some(2));
        assert_eq!(results[1].metadata.chunk_index, 0);

        let response: QueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_results(0.5).len(), 1);
    }

    #[test]
    fn test_stats_and_describe_parsing() {
        let stats: StatsResponse = serde_json::from_str(
            r#"{"namespaces":{"":{"vectorCount":120}},"dimension":3072,"indexFullness":0.0,"totalVectorCount":120}"#,
        )
        .unwrap();
        assert_eq!(stats.total_vector_count, 120);
        assert_eq!(stats.dimension, Some(3072));

        let description: IndexDescription = serde_json::from_str(
            r#"{"name":"ai-advisor-index","dimension":3072,"metric":"cosine",
                "host":"ai-advisor-index-x.svc.pinecone.io",
                "status":{"ready":true,"state":"Ready"}}"#,
        )
        .unwrap();
        assert!(description.is_ready());
        assert_eq!(description.dimension, Some(3072));
    }

    const INDEX: &str = "test-index";

    /// Serve `router` on an ephemeral local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn local_store(base: &str, host: Option<&str>) -> PineconeStore {
        let settings = PineconeSettings {
            index_name: INDEX.to_string(),
            control_plane_url: base.to_string(),
            host: host.map(str::to_string),
            max_retries: 2,
            retry_delay_ms: 0,
            batch_delay_ms: 0,
            ready_timeout_seconds: 10,
            ..PineconeSettings::default()
        };
        PineconeStore::new("pc-test", &settings).unwrap()
    }

    #[derive(Default)]
    struct Calls {
        count: AtomicUsize,
        failures: usize,
    }

    async fn flaky_query(State(calls): State<Arc<Calls>>) -> (HttpStatus, Json<Value>) {
        let attempt = calls.count.fetch_add(1, Ordering::SeqCst);
        if attempt < calls.failures {
            let status = if attempt % 2 == 0 {
                HttpStatus::TOO_MANY_REQUESTS
            } else {
                HttpStatus::SERVICE_UNAVAILABLE
            };
            return (status, Json(json!({ "error": "busy" })));
        }
        (HttpStatus::OK, Json(json!({ "matches": [] })))
    }

    #[tokio::test]
    async fn test_retries_rate_limits_and_server_errors() {
        let calls = Arc::new(Calls {
            failures: 2,
            ..Calls::default()
        });
        let base = serve(
            Router::new()
                .route("/query", post(flaky_query))
                .with_state(calls.clone()),
        )
        .await;

        let store = local_store(&base, Some(&base));
        let results = store.query(&[0.1, 0.2], 4, 0.0).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(calls.count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(Calls {
            failures: usize::MAX,
            ..Calls::default()
        });
        let base = serve(
            Router::new()
                .route("/query", post(flaky_query))
                .with_state(calls.clone()),
        )
        .await;

        let store = local_store(&base, Some(&base));
        let result = store.query(&[0.1, 0.2], 4, 0.0).await;
        assert!(matches!(result, Err(AdvisorError::VectorStore(_))));
        assert_eq!(calls.count.load(Ordering::SeqCst), 3);
    }

    #[derive(Default)]
    struct Listing {
        tokens: Mutex<Vec<Option<String>>>,
        deleted: Mutex<Vec<String>>,
    }

    async fn list_page(
        State(listing): State<Arc<Listing>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let token = params.get("paginationToken").cloned();
        listing.tokens.lock().unwrap().push(token.clone());

        let prefix = params.get("prefix").cloned().unwrap_or_default();
        match token.as_deref() {
            None => Json(json!({
                "vectors": [{ "id": format!("{}0", prefix) }, { "id": format!("{}1", prefix) }],
                "pagination": { "next": "page-2" }
            })),
            _ => Json(json!({ "vectors": [{ "id": format!("{}2", prefix) }] })),
        }
    }

    async fn delete_vectors(State(listing): State<Arc<Listing>>, Json(body): Json<Value>) -> Json<Value> {
        let ids = body["ids"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|id| id.as_str().map(str::to_string)).collect::<Vec<_>>())
            .unwrap_or_default();
        listing.deleted.lock().unwrap().extend(ids);
        Json(json!({}))
    }

    #[tokio::test]
    async fn test_delete_stale_follows_pagination() {
        let listing = Arc::new(Listing::default());
        let base = serve(
            Router::new()
                .route("/vectors/list", get(list_page))
                .route("/vectors/delete", post(delete_vectors))
                .with_state(listing.clone()),
        )
        .await;

        let store = local_store(&base, Some(&base));
        let url = "https://example.com/catalog.pdf";
        let keep = vec![record_id(url, 0)];

        let deleted = store.delete_stale(url, &keep).await.unwrap();
        assert_eq!(deleted, 2);

        let tokens = listing.tokens.lock().unwrap().clone();
        assert_eq!(tokens, vec![None, Some("page-2".to_string())]);

        let removed = listing.deleted.lock().unwrap().clone();
        assert_eq!(removed, vec![record_id(url, 1), record_id(url, 2)]);
    }

    #[tokio::test]
    async fn test_missing_index_maps_to_not_found() {
        let base = serve(
            Router::new()
                .route(
                    &format!("/indexes/{}", INDEX),
                    get(|| async { HttpStatus::NOT_FOUND }).delete(|| async { HttpStatus::NOT_FOUND }),
                )
                .route(
                    "/describe_index_stats",
                    post(|| async { (HttpStatus::NOT_FOUND, "namespace not found") }),
                ),
        )
        .await;

        let store = local_store(&base, None);
        assert!(!store.index_exists().await.unwrap());
        assert!(matches!(store.delete_index().await, Err(AdvisorError::NotFound(_))));
        assert!(matches!(store.stats().await, Err(AdvisorError::NotFound(_))));

        let with_host = local_store(&base, Some(&base));
        assert!(matches!(with_host.stats().await, Err(AdvisorError::NotFound(_))));
    }

    #[derive(Default)]
    struct Lifecycle {
        created: Mutex<Option<Value>>,
        describes: AtomicUsize,
        host: Mutex<String>,
    }

    async fn describe(State(state): State<Arc<Lifecycle>>) -> (HttpStatus, Json<Value>) {
        if state.created.lock().unwrap().is_none() {
            return (HttpStatus::NOT_FOUND, Json(json!({ "error": "not found" })));
        }
        // Not ready on the first describe after creation.
        let ready = state.describes.fetch_add(1, Ordering::SeqCst) > 0;
        let phase = if ready { "Ready" } else { "Initializing" };
        let host = state.host.lock().unwrap().clone();
        (
            HttpStatus::OK,
            Json(json!({
                "name": INDEX,
                "dimension": 3,
                "host": host,
                "status": { "ready": ready, "state": phase }
            })),
        )
    }

    async fn create(State(state): State<Arc<Lifecycle>>, Json(body): Json<Value>) -> HttpStatus {
        *state.created.lock().unwrap() = Some(body);
        HttpStatus::CREATED
    }

    #[tokio::test]
    async fn test_ensure_index_creates_and_waits_until_ready() {
        let state = Arc::new(Lifecycle::default());
        let base = serve(
            Router::new()
                .route("/indexes", post(create))
                .route(&format!("/indexes/{}", INDEX), get(describe))
                .route(
                    "/describe_index_stats",
                    post(|| async { Json(json!({ "totalVectorCount": 0, "dimension": 3 })) }),
                )
                .with_state(state.clone()),
        )
        .await;
        *state.host.lock().unwrap() = base.clone();

        let store = local_store(&base, None);
        assert!(store.ensure_index(3).await.unwrap());
        assert!(state.describes.load(Ordering::SeqCst) >= 2);

        let body = state.created.lock().unwrap().clone().unwrap();
        assert_eq!(body["name"], INDEX);
        assert_eq!(body["dimension"], 3);
        assert_eq!(body["spec"]["serverless"]["region"], "us-east-1");

        // Host comes from the ready description.
        assert_eq!(store.stats().await.unwrap().dimension, Some(3));
        assert!(!store.ensure_index(3).await.unwrap());
        assert!(store.ensure_index(4).await.is_err());
    }

    #[test]
    fn test_list_response_parsing() {
        let page: ListResponse = serde_json::from_str(
            r#"{"vectors":[{"id":"doc#0"},{"id":"doc#1"}],"pagination":{"next":"token"},"namespace":""}"#,
        )
        .unwrap();
        assert_eq!(page.vectors.len(), 2);
        assert_eq!(page.pagination.and_then(|p| p.next).as_deref(), Some("token"));

        let last: ListResponse = serde_json::from_str(r#"{"vectors":[]}"#).unwrap();
        assert!(last.pagination.is_none());
    }
}

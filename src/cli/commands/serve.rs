//! Web UI and HTTP API server.
//!
//! Serves a single-page question form and JSON endpoints for asking
//! questions, searching and checking the knowledge base.

use super::rag_engine;
use crate::cli::output::content_preview;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::AdvisorError;
use crate::orchestrator::{KnowledgeBaseStatus, Orchestrator};
use crate::rag::{AskOptions, ContextBuilder, ContextChunk, RagEngine};
use crate::source::SourceKind;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

const INDEX_HTML: &str = include_str!("ui.html");

/// Characters of chunk text shown per source.
const PREVIEW_CHARS: usize = 500;

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
    engine: RagEngine,
}

/// Run the web server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let orchestrator = Orchestrator::new(settings.clone())?;
    let engine = rag_engine(&settings, &orchestrator)?;

    match orchestrator.knowledge_base_status().await {
        Ok(KnowledgeBaseStatus::Ready(count)) => {
            Output::success(&format!("Knowledge base ready ({} vectors)", count))
        }
        Ok(_) => Output::warning("The knowledge base is empty. Ingest documents before asking."),
        Err(e) => Output::warning(&format!("Could not reach the vector store: {}", e)),
    }

    let state = Arc::new(AppState {
        orchestrator,
        engine,
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Advisor Web UI");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Web UI", "GET  /");
    Output::kv("Health", "GET  /health");
    Output::kv("Stats", "GET  /stats");
    Output::kv("Ask (RAG)", "POST /ask");
    Output::kv("Search", "POST /search");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ask", post(ask))
        .route("/search", post(search))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<SourceInfo>,
}

#[derive(Debug, Serialize)]
struct SourceInfo {
    citation: String,
    title: String,
    source_url: String,
    source_type: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    chunk_index: usize,
    total_chunks: usize,
    score: f32,
    preview: String,
}

impl From<ContextChunk> for SourceInfo {
    fn from(chunk: ContextChunk) -> Self {
        Self {
            citation: chunk.citation(),
            preview: content_preview(&chunk.content, PREVIEW_CHARS),
            title: chunk.title,
            source_url: chunk.source_url,
            source_type: chunk.source_type,
            page: chunk.page,
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            score: chunk.score,
        }
    }
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    min_score: f32,
}

fn default_limit() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SourceInfo>,
}

#[derive(Serialize)]
struct StatsResponse {
    backend: &'static str,
    status: &'static str,
    total_vector_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    documents: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(e: AdvisorError) -> Response {
    let status = match e {
        AdvisorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", e);
    }
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

// === Handlers ===

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(INDEX_HTML.replace("{{system_prompt}}", &escape_html(state.engine.system_prompt())))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Response {
    let store = state.orchestrator.vector_store();
    let documents = state.orchestrator.processed_document_count();

    let stats = match store.index_exists().await {
        Ok(false) => None,
        Ok(true) => match store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => return error_response(e),
        },
        Err(e) => return error_response(e),
    };

    let label = match &stats {
        None => "missing",
        Some(s) if s.total_vector_count > 0 => "ready",
        Some(_) => "empty",
    };

    Json(StatsResponse {
        backend: store.name(),
        status: label,
        total_vector_count: stats.as_ref().map_or(0, |s| s.total_vector_count),
        dimension: stats.and_then(|s| s.dimension),
        documents,
    })
    .into_response()
}

async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Response {
    let options = AskOptions {
        system_prompt: req.system_prompt,
        top_k: req.top_k,
        model: req.model.filter(|m| !m.trim().is_empty()),
    };

    match state.engine.ask_with_options(&req.question, &options).await {
        Ok(response) => Json(AskResponse {
            answer: response.answer,
            sources: response.sources.into_iter().map(SourceInfo::from).collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Response {
    if req.query.trim().is_empty() {
        return error_response(AdvisorError::InvalidInput("Query is empty".to_string()));
    }

    let builder = ContextBuilder::new(
        state.orchestrator.vector_store(),
        state.orchestrator.embedder(),
    )
    .with_top_k(req.limit)
    .with_min_score(req.min_score);

    match builder.build(&req.query).await {
        Ok(chunks) => Json(SearchResponse {
            results: chunks.into_iter().map(SourceInfo::from).collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::OpenAIEmbedder;
    use crate::source::{PdfSource, WebScraper};
    use crate::vector_store::{MemoryVectorStore, VectorStore};
    use serde_json::{json, Value};

    /// Serve the router over a memory store and return its base URL.
    async fn spawn_app(dir: &std::path::Path) -> String {
        let mut settings = Settings::default();
        settings.catalog.path = dir.join("catalog.json").display().to_string();

        let store = Arc::new(MemoryVectorStore::new());
        store.ensure_index(3).await.unwrap();

        let orchestrator = Orchestrator::with_components(
            settings.clone(),
            Arc::new(WebScraper::new(&settings.scraper).unwrap()),
            Arc::new(PdfSource::new(&settings.pdf, dir).unwrap()),
            Arc::new(OpenAIEmbedder::from_settings(&settings.embedding).unwrap()),
            store.clone(),
        )
        .unwrap();
        let engine = RagEngine::new(store, orchestrator.embedder(), &settings.rag).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::new(AppState {
            orchestrator,
            engine,
        }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_invalid_requests_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(dir.path()).await;
        let client = reqwest::Client::new();

        let requests = [
            ("/ask", json!({ "question": "What is ECON 2105?", "top_k": 0 })),
            ("/ask", json!({ "question": "   " })),
            ("/search", json!({ "query": "ECON", "limit": 0 })),
            ("/search", json!({ "query": "" })),
        ];

        for (path, body) in requests {
            let response = client
                .post(format!("{}{}", base, path))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", path, body);

            let error: Value = response.json().await.unwrap();
            assert!(error["error"].as_str().is_some_and(|e| !e.is_empty()));
        }
    }

    #[test]
    fn test_source_info_caps_preview() {
        let chunk = ContextChunk {
            source_url: "https://example.com/catalog.pdf".to_string(),
            title: "Catalog".to_string(),
            content: "x".repeat(800),
            chunk_index: 3,
            total_chunks: 10,
            source_type: SourceKind::Pdf,
            page: Some(7),
            score: 0.75,
        };

        let info = SourceInfo::from(chunk);
        assert_eq!(info.citation, "Catalog, p. 7");
        assert_eq!(info.preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(info.preview.ends_with("..."));
    }

    #[test]
    fn test_error_status_mapping() {
        let bad = error_response(AdvisorError::InvalidInput("Question is empty".to_string()));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let failed = error_response(AdvisorError::VectorStore("down".to_string()));
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_ask_request_optional_fields() {
        let req: AskRequest = serde_json::from_str(r#"{"question": "Hi"}"#).unwrap();
        assert_eq!(req.question, "Hi");
        assert!(req.system_prompt.is_none());
        assert!(req.top_k.is_none());

        let req: SearchRequest = serde_json::from_str(r#"{"query": "econ"}"#).unwrap();
        assert_eq!(req.limit, 5);
        assert_eq!(req.min_score, 0.0);
    }

    #[test]
    fn test_index_page_has_form() {
        assert!(INDEX_HTML.contains("system-prompt"));
        assert!(INDEX_HTML.contains("{{system_prompt}}"));
        assert!(INDEX_HTML.contains("/ask"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }
}

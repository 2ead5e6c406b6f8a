//! Configuration settings for Advisor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub scraper: ScraperSettings,
    pub pdf: PdfSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub rag: RagSettings,
    pub catalog: CatalogSettings,
    pub snapshot: SnapshotSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary files (downloaded PDFs).
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.advisor".to_string(),
            temp_dir: "/tmp/advisor".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Web page scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// User-Agent header sent with every page request.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Delay between consecutive URLs, in milliseconds.
    pub request_delay_ms: u64,
    /// CSS selectors tried in order to locate the main content.
    pub content_selectors: Vec<String>,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            timeout_seconds: 30,
            request_delay_ms: 100,
            content_selectors: [
                "main",
                "article",
                ".content",
                "#content",
                ".main-content",
                ".post-content",
                ".entry-content",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// PDF download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    /// Download timeout in seconds. Catalog PDFs can be large.
    pub timeout_seconds: u64,
    /// Title used when none is supplied for a PDF.
    pub default_title: String,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            default_title: "PDF Document".to_string(),
        }
    }
}

/// Text chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Number of texts sent per embeddings request.
    pub batch_size: usize,
    /// Delay between embedding requests, in milliseconds.
    pub request_delay_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            batch_size: 100,
            request_delay_ms: 100,
        }
    }
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreProvider {
    /// Pinecone serverless index (default).
    #[default]
    Pinecone,
    /// Local SQLite file with brute-force cosine search.
    Sqlite,
    /// Process-local store, lost on exit.
    Memory,
}

impl std::str::FromStr for VectorStoreProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pinecone" => Ok(VectorStoreProvider::Pinecone),
            "sqlite" => Ok(VectorStoreProvider::Sqlite),
            "memory" => Ok(VectorStoreProvider::Memory),
            _ => Err(format!("Unknown vector store provider: {}", s)),
        }
    }
}

impl std::fmt::Display for VectorStoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorStoreProvider::Pinecone => write!(f, "pinecone"),
            VectorStoreProvider::Sqlite => write!(f, "sqlite"),
            VectorStoreProvider::Memory => write!(f, "memory"),
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Vector store provider (pinecone, sqlite, memory).
    pub provider: VectorStoreProvider,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
    /// Maximum characters of chunk text stored as vector metadata.
    pub metadata_content_limit: usize,
    /// Pinecone-specific settings.
    pub pinecone: PineconeSettings,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: VectorStoreProvider::Pinecone,
            sqlite_path: "~/.advisor/vectors.db".to_string(),
            metadata_content_limit: 1000,
            pinecone: PineconeSettings::default(),
        }
    }
}

/// Pinecone index and request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeSettings {
    /// Index name.
    pub index_name: String,
    /// Serverless cloud provider.
    pub cloud: String,
    /// Serverless region.
    pub region: String,
    /// Similarity metric used when creating the index.
    pub metric: String,
    /// Namespace for all reads and writes. Empty means the default namespace.
    pub namespace: String,
    /// Index host override. Resolved through the control plane when unset.
    pub host: Option<String>,
    /// Control plane base URL.
    pub control_plane_url: String,
    /// Value of the X-Pinecone-API-Version header.
    pub api_version: String,
    /// Vectors per upsert request.
    pub upsert_batch_size: usize,
    /// Delay between upsert batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Attempts for rate-limited or failed requests.
    pub max_retries: usize,
    /// Fixed delay between retries, in milliseconds.
    pub retry_delay_ms: u64,
    /// How long to wait for a new index to become ready.
    pub ready_timeout_seconds: u64,
}

impl Default for PineconeSettings {
    fn default() -> Self {
        Self {
            index_name: "ai-advisor-index".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            metric: "cosine".to_string(),
            namespace: String::new(),
            host: None,
            control_plane_url: "https://api.pinecone.io".to_string(),
            api_version: "2024-07".to_string(),
            upsert_batch_size: 100,
            batch_delay_ms: 100,
            max_retries: 3,
            retry_delay_ms: 1000,
            ready_timeout_seconds: 120,
        }
    }
}

/// RAG (Retrieval-Augmented Generation) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// LLM model for response generation.
    pub model: String,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Minimum similarity score for a chunk to be used.
    pub min_score: f32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            top_k: 4,
            min_score: 0.0,
            temperature: 0.7,
        }
    }
}

/// Processed-document catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Path to the JSON catalog.
    pub path: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: "~/.advisor/document_catalog.json".to_string(),
        }
    }
}

/// Scraped-data snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Path to the JSON snapshot written by `scrape` and read by `upload`.
    pub path: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            path: "~/.advisor/scraped_data.json".to_string(),
        }
    }
}

/// Local web UI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

/// Cloud suffixes accepted at the end of `PINECONE_ENVIRONMENT`.
const CLOUD_SUFFIXES: [&str; 3] = ["aws", "gcp", "azure"];

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// Environment overrides are applied after the file is read.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = non_empty("PINECONE_INDEX_NAME") {
            self.vector_store.pinecone.index_name = name.trim().to_string();
        }

        if let Some(env) = non_empty("PINECONE_ENVIRONMENT") {
            let (region, cloud) = split_environment(env.trim());
            self.vector_store.pinecone.region = region;
            if let Some(cloud) = cloud {
                self.vector_store.pinecone.cloud = cloud;
            }
        }

        if let Some(provider) = non_empty("ADVISOR_VECTOR_STORE") {
            match provider.parse() {
                Ok(p) => self.vector_store.provider = p,
                Err(e) => tracing::warn!("Ignoring ADVISOR_VECTOR_STORE: {}", e),
            }
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AdvisorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("advisor")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Get the expanded catalog path.
    pub fn catalog_path(&self) -> PathBuf {
        Self::expand_path(&self.catalog.path)
    }

    /// Get the expanded snapshot path.
    pub fn snapshot_path(&self) -> PathBuf {
        Self::expand_path(&self.snapshot.path)
    }
}

/// Split a Pinecone environment like `us-east-1-aws` into region and cloud.
fn split_environment(env: &str) -> (String, Option<String>) {
    for cloud in CLOUD_SUFFIXES {
        if let Some(region) = env.strip_suffix(&format!("-{}", cloud)) {
            if !region.is_empty() {
                return (region.to_string(), Some(cloud.to_string()));
            }
        }
    }
    (env.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_large_embedding_model() {
        let settings = Settings::default();
        assert_eq!(settings.embedding.model, "text-embedding-3-large");
        assert_eq!(settings.embedding.dimensions, 3072);
        assert_eq!(settings.chunking.chunk_size, 1000);
        assert_eq!(settings.chunking.chunk_overlap, 200);
        assert_eq!(settings.vector_store.pinecone.index_name, "ai-advisor-index");
    }

    #[test]
    fn test_env_overrides_index_and_region() {
        let mut settings = Settings::default();
        settings.apply_env(lookup(&[
            ("PINECONE_INDEX_NAME", "catalog-index"),
            ("PINECONE_ENVIRONMENT", "us-west-2-aws"),
        ]));

        assert_eq!(settings.vector_store.pinecone.index_name, "catalog-index");
        assert_eq!(settings.vector_store.pinecone.region, "us-west-2");
        assert_eq!(settings.vector_store.pinecone.cloud, "aws");
    }

    #[test]
    fn test_env_region_without_cloud_suffix() {
        let mut settings = Settings::default();
        settings.apply_env(lookup(&[("PINECONE_ENVIRONMENT", "europe-west4-gcp")]));
        assert_eq!(settings.vector_store.pinecone.region, "europe-west4");
        assert_eq!(settings.vector_store.pinecone.cloud, "gcp");

        let mut settings = Settings::default();
        settings.apply_env(lookup(&[("PINECONE_ENVIRONMENT", "eu-west-1")]));
        assert_eq!(settings.vector_store.pinecone.region, "eu-west-1");
        assert_eq!(settings.vector_store.pinecone.cloud, "aws");
    }

    #[test]
    fn test_env_provider_override() {
        let mut settings = Settings::default();
        settings.apply_env(lookup(&[("ADVISOR_VECTOR_STORE", "sqlite")]));
        assert_eq!(settings.vector_store.provider, VectorStoreProvider::Sqlite);

        settings.apply_env(lookup(&[("ADVISOR_VECTOR_STORE", "nonsense")]));
        assert_eq!(settings.vector_store.provider, VectorStoreProvider::Sqlite);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(lookup(&[("PINECONE_INDEX_NAME", "  ")]));
        assert_eq!(settings.vector_store.pinecone.index_name, "ai-advisor-index");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [chunking]
            chunk_size = 500

            [vector_store]
            provider = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(settings.chunking.chunk_size, 500);
        assert_eq!(settings.chunking.chunk_overlap, 200);
        assert_eq!(settings.vector_store.provider, VectorStoreProvider::Memory);
        assert_eq!(settings.vector_store.pinecone.metric, "cosine");
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.rag.top_k = 7;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.rag.top_k, 7);
    }
}

//! Catalog of processed documents.
//!
//! Batch ingestion records every attempt here so later runs can skip
//! documents that are already in the knowledge base.

use crate::error::{AdvisorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub url: String,
    pub title: String,
    pub processed_at: DateTime<Utc>,
    pub chunks_count: usize,
    pub success: bool,
    /// Sequential catalog ID, e.g. "doc_3".
    pub document_id: String,
}

/// Aggregate counts over the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSummary {
    pub total_documents: usize,
    pub successful_documents: usize,
    pub failed_documents: usize,
    pub total_chunks: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// JSON-backed document catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentCatalog {
    #[serde(default)]
    pub documents: Vec<CatalogEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_processed: usize,
    #[serde(skip)]
    path: PathBuf,
}

impl DocumentCatalog {
    /// Load the catalog at `path`. A missing or unreadable file yields an
    /// empty catalog.
    pub fn load(path: &Path) -> Self {
        let mut catalog = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<DocumentCatalog>(&content) {
                Ok(catalog) => {
                    debug!("Loaded {} catalog entries", catalog.documents.len());
                    catalog
                }
                Err(e) => {
                    warn!("Ignoring unreadable catalog {:?}: {}", path, e);
                    DocumentCatalog::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DocumentCatalog::default(),
            Err(e) => {
                warn!("Could not read catalog {:?}: {}", path, e);
                DocumentCatalog::default()
            }
        };

        catalog.path = path.to_path_buf();
        catalog
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the catalog, refreshing `last_updated`.
    pub fn save(&mut self) -> Result<()> {
        self.last_updated = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AdvisorError::Catalog(format!("Failed to serialize catalog: {}", e)))?;
        std::fs::write(&self.path, content)?;

        debug!("Saved catalog to {:?}", self.path);
        Ok(())
    }

    /// True when the URL was processed successfully.
    pub fn is_processed(&self, url: &str) -> bool {
        self.documents.iter().any(|d| d.url == url && d.success)
    }

    pub fn get(&self, url: &str) -> Option<&CatalogEntry> {
        self.documents.iter().find(|d| d.url == url)
    }

    /// Record a processing attempt and save.
    ///
    /// An existing entry for the same URL is replaced and keeps its ID.
    pub fn add(&mut self, url: &str, title: &str, chunks_count: usize, success: bool) -> Result<()> {
        let document_id = match self.documents.iter().position(|d| d.url == url) {
            Some(pos) => self.documents.remove(pos).document_id,
            None => format!("doc_{}", self.next_sequence()),
        };

        self.documents.push(CatalogEntry {
            url: url.to_string(),
            title: title.to_string(),
            processed_at: Utc::now(),
            chunks_count,
            success,
            document_id,
        });

        if success {
            self.total_processed += 1;
        }

        self.save()
    }

    fn next_sequence(&self) -> usize {
        self.documents
            .iter()
            .filter_map(|d| d.document_id.strip_prefix("doc_")?.parse::<usize>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn summary(&self) -> CatalogSummary {
        let total_documents = self.documents.len();
        let successful: Vec<&CatalogEntry> = self.documents.iter().filter(|d| d.success).collect();

        CatalogSummary {
            total_documents,
            successful_documents: successful.len(),
            failed_documents: total_documents - successful.len(),
            total_chunks: successful.iter().map(|d| d.chunks_count).sum(),
            last_updated: self.last_updated,
        }
    }

    /// Successfully processed documents.
    pub fn processed_documents(&self) -> Vec<&CatalogEntry> {
        self.documents.iter().filter(|d| d.success).collect()
    }

    /// Remove a URL from the catalog and save. Returns false if it was absent.
    pub fn remove(&mut self, url: &str) -> Result<bool> {
        let before = self.documents.len();
        self.documents.retain(|d| d.url != url);

        if self.documents.len() == before {
            return Ok(false);
        }

        self.save()?;
        info!("Removed {} from catalog", url);
        Ok(true)
    }
}

//! Document sources for Advisor.
//!
//! Provides a trait-based interface over the places text comes from:
//! HTML pages and PDF files reachable over HTTP.

mod pdf;
mod web;

pub use pdf::PdfSource;
pub use web::WebScraper;

use crate::error::{AdvisorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Type of document source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Web,
    Pdf,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Web => write!(f, "web"),
            SourceKind::Pdf => write!(f, "pdf"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(SourceKind::Web),
            "pdf" => Ok(SourceKind::Pdf),
            _ => Err(format!("Unknown source type: {}", s)),
        }
    }
}

/// A fetched document with its extracted text.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// URL the document was fetched from.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Source type.
    pub kind: SourceKind,
    /// Extracted text, one entry per page. Web pages have a single entry.
    pub pages: Vec<String>,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
}

impl FetchedDocument {
    /// Total characters of extracted text.
    pub fn text_len(&self) -> usize {
        self.pages.iter().map(|p| p.chars().count()).sum()
    }

    /// True when no page carries any text.
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }
}

/// Trait for document source providers.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Get the source type.
    fn kind(&self) -> SourceKind;

    /// Check if this source can handle the given URL.
    fn can_handle(&self, url: &Url) -> bool;

    /// Fetch a document and extract its text.
    ///
    /// `title` overrides whatever title the source would derive itself.
    async fn fetch(&self, url: &Url, title: Option<&str>) -> Result<FetchedDocument>;
}

/// Parse and validate a document URL.
pub fn parse_url(input: &str) -> Result<Url> {
    let url = Url::parse(input.trim())
        .map_err(|e| AdvisorError::InvalidInput(format!("Invalid URL '{}': {}", input, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AdvisorError::InvalidInput(format!(
            "Unsupported URL scheme '{}' in {}",
            other, input
        ))),
    }
}

/// Decide which kind of source serves a URL.
pub fn detect_kind(url: &Url) -> SourceKind {
    if url.path().to_lowercase().ends_with(".pdf") {
        SourceKind::Pdf
    } else {
        SourceKind::Web
    }
}

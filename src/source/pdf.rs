//! PDF download and text extraction.
//!
//! PDFs are streamed to a temporary file, read page by page, and the file is
//! removed as soon as the handle drops.

use super::{DocumentSource, FetchedDocument, SourceKind};
use crate::config::PdfSettings;
use crate::error::{AdvisorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// PDF document source.
pub struct PdfSource {
    client: reqwest::Client,
    temp_dir: PathBuf,
    default_title: String,
    hyphen_break: Regex,
    trailing_space: Regex,
    blank_lines: Regex,
}

impl PdfSource {
    /// Create a PDF source that downloads into `temp_dir`.
    pub fn new(settings: &PdfSettings, temp_dir: &Path) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            temp_dir: temp_dir.to_path_buf(),
            default_title: settings.default_title.clone(),
            hyphen_break: compile(r"(\w)-\n(\w)")?,
            trailing_space: compile(r"[ \t]+\n")?,
            blank_lines: compile(r"\n{3,}")?,
        })
    }

    /// Download a PDF into a temporary file.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download(&self, url: &Url) -> Result<NamedTempFile> {
        info!("Downloading PDF from {}", url);
        std::fs::create_dir_all(&self.temp_dir)?;

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdvisorError::Fetch(format!("{}: {}", url, e)))?;

        let mut file = tempfile::Builder::new()
            .prefix("advisor-")
            .suffix(".pdf")
            .tempfile_in(&self.temp_dir)?;

        let mut written = 0usize;
        while let Some(bytes) = response
            .chunk()
            .await
            .map_err(|e| AdvisorError::Fetch(format!("{}: {}", url, e)))?
        {
            file.write_all(&bytes)?;
            written += bytes.len();
        }
        file.flush()?;

        debug!("Downloaded {} bytes to {:?}", written, file.path());
        Ok(file)
    }

    /// Extract normalized text from every page of a PDF on disk.
    ///
    /// Pages that fail to extract or carry no text are skipped.
    pub async fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let path = path.to_path_buf();
        let raw_pages = tokio::task::spawn_blocking(move || read_pages(&path))
            .await
            .map_err(|e| AdvisorError::Extraction(format!("Extraction task failed: {}", e)))??;

        let pages: Vec<String> = raw_pages
            .into_iter()
            .map(|text| self.normalize(&text))
            .filter(|text| !text.is_empty())
            .collect();

        info!("Extracted text from {} pages", pages.len());
        Ok(pages)
    }

    /// Clean up PDF text: rejoin hyphenated line breaks, drop trailing
    /// spaces and collapse runs of blank lines.
    pub fn normalize(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n");
        let text = self.hyphen_break.replace_all(&text, "$1$2");
        let text = self.trailing_space.replace_all(&text, "\n");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        text.trim().to_string()
    }
}

#[async_trait]
impl DocumentSource for PdfSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pdf
    }

    fn can_handle(&self, url: &Url) -> bool {
        super::detect_kind(url) == SourceKind::Pdf
    }

    #[instrument(skip(self, title), fields(url = %url))]
    async fn fetch(&self, url: &Url, title: Option<&str>) -> Result<FetchedDocument> {
        let file = self.download(url).await?;
        let pages = self.extract_pages(file.path()).await?;

        if pages.is_empty() {
            return Err(AdvisorError::Extraction(format!(
                "No text extracted from PDF {}",
                url
            )));
        }

        Ok(FetchedDocument {
            url: url.to_string(),
            title: title
                .map(str::to_string)
                .unwrap_or_else(|| self.default_title.clone()),
            kind: SourceKind::Pdf,
            pages,
            fetched_at: Utc::now(),
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AdvisorError::Config(format!("Invalid pattern: {}", e)))
}

/// Read raw text from each page, in page order.
fn read_pages(path: &Path) -> Result<Vec<String>> {
    let document = lopdf::Document::load(path)
        .map_err(|e| AdvisorError::Extraction(format!("Failed to open PDF: {}", e)))?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Extracted text from page {}", page_number);
                pages.push(text);
            }
            Ok(_) => debug!("Page {} has no text", page_number),
            Err(e) => warn!("Error extracting page {}: {}", page_number, e),
        }
    }

    Ok(pages)
}

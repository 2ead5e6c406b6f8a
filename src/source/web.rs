//! Web page scraping.
//!
//! Fetches HTML over HTTP and reduces it to the readable text of the page's
//! main content area.

use super::{DocumentSource, FetchedDocument, SourceKind};
use crate::config::ScraperSettings;
use crate::error::{AdvisorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Title used when a page has no `<title>` element.
const UNTITLED: &str = "No Title";

/// Elements whose text never belongs to the page content.
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Title and text extracted from an HTML page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub content: String,
}

/// HTML scraper.
pub struct WebScraper {
    client: reqwest::Client,
    content_selectors: Vec<Selector>,
    title_selector: Selector,
    body_selector: Selector,
}

impl WebScraper {
    /// Create a scraper from settings.
    pub fn new(settings: &ScraperSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            content_selectors: parse_selectors(&settings.content_selectors),
            title_selector: parse_selector("title")?,
            body_selector: parse_selector("body")?,
        })
    }

    /// Extract the title and main text from raw HTML.
    pub fn extract(&self, html: &str) -> ExtractedPage {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title_selector)
            .next()
            .map(|t| collapse_whitespace(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let root = self
            .content_selectors
            .iter()
            .find_map(|selector| document.select(selector).next())
            .or_else(|| document.select(&self.body_selector).next())
            .unwrap_or_else(|| document.root_element());

        let mut raw = String::new();
        collect_text(root, &mut raw);

        ExtractedPage {
            title,
            content: collapse_whitespace(&raw),
        }
    }
}

#[async_trait]
impl DocumentSource for WebScraper {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    fn can_handle(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    #[instrument(skip(self, title), fields(url = %url))]
    async fn fetch(&self, url: &Url, title: Option<&str>) -> Result<FetchedDocument> {
        info!("Scraping {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdvisorError::Fetch(format!("{}: {}", url, e)))?;

        let is_pdf = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/pdf"));
        if is_pdf {
            return Err(AdvisorError::InvalidInput(format!(
                "{} serves a PDF, not an HTML page",
                url
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AdvisorError::Fetch(format!("{}: {}", url, e)))?;

        let page = self.extract(&html);
        debug!("Extracted {} characters from {}", page.content.len(), url);

        if page.content.is_empty() {
            warn!("No text content found at {}", url);
        }

        Ok(FetchedDocument {
            url: url.to_string(),
            title: title.map(str::to_string).unwrap_or(page.title),
            kind: SourceKind::Web,
            pages: vec![page.content],
            fetched_at: Utc::now(),
        })
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AdvisorError::Config(format!("Invalid CSS selector '{}': {}", css, e)))
}

fn parse_selectors(selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|css| match parse_selector(css) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Skipping content selector: {}", e);
                None
            }
        })
        .collect()
}

/// Append the text under `element`, skipping script-like subtrees.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if SKIPPED_TAGS.contains(&element.value().name()) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(&text.text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> WebScraper {
        WebScraper::new(&ScraperSettings::default()).unwrap()
    }

    #[test]
    fn test_extract_prefers_main_content() {
        let html = r#"
            <html>
              <head><title>  Economics
                Courses </title></head>
              <body>
                <nav>Home | About</nav>
                <main>
                  <h1>ECON 2105</h1>
                  <p>Principles of   Macroeconomics.</p>
                  <script>var tracking = 1;</script>
                </main>
                <footer>Copyright</footer>
              </body>
            </html>"#;

        let page = scraper().extract(html);
        assert_eq!(page.title, "Economics Courses");
        assert_eq!(page.content, "ECON 2105 Principles of Macroeconomics.");
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        let html = r#"
            <html><body>
              <div>Prerequisite: MATH 1111</div>
              <style>.x { color: red; }</style>
            </body></html>"#;

        let page = scraper().extract(html);
        assert_eq!(page.title, UNTITLED);
        assert_eq!(page.content, "Prerequisite: MATH 1111");
    }

    #[test]
    fn test_extract_uses_class_selector() {
        let html = r#"
            <html><body>
              <div class="sidebar">Links</div>
              <div class="entry-content"><p>Advising hours are 9 to 5.</p></div>
            </body></html>"#;

        let page = scraper().extract(html);
        assert_eq!(page.content, "Advising hours are 9 to 5.");
    }

    #[test]
    fn test_invalid_selectors_are_skipped() {
        let mut settings = ScraperSettings::default();
        settings.content_selectors = vec!["[[[".to_string(), "article".to_string()];
        let scraper = WebScraper::new(&settings).unwrap();
        assert_eq!(scraper.content_selectors.len(), 1);
    }
}

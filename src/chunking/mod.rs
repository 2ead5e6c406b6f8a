//! Text chunking for breaking documents into searchable segments.
//!
//! Documents are split with a recursive, separator-based splitter that keeps
//! chunks under a character budget and overlaps neighbouring chunks.

mod recursive;

pub use recursive::RecursiveSplitter;

use crate::source::{FetchedDocument, SourceKind};
use serde::{Deserialize, Serialize};

/// A chunk of text from a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Text content of this chunk.
    pub content: String,
    /// URL of the document the chunk came from.
    pub source_url: String,
    /// Title of the source document.
    pub title: String,
    /// Position of this chunk in the document, starting at 0.
    pub chunk_index: usize,
    /// Number of chunks the document was split into.
    pub total_chunks: usize,
    /// 1-based page among the extracted PDF pages.
    pub page: Option<u32>,
}

impl ContentChunk {
    /// Number of characters in the chunk.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Short label for display, e.g. "Catalog (chunk 3/12)".
    pub fn label(&self) -> String {
        match self.page {
            Some(page) => format!(
                "{} (p. {}, chunk {}/{})",
                self.title,
                page,
                self.chunk_index + 1,
                self.total_chunks
            ),
            None => format!(
                "{} (chunk {}/{})",
                self.title,
                self.chunk_index + 1,
                self.total_chunks
            ),
        }
    }
}

/// Split every page of a document and number the chunks across the whole
/// document.
pub fn chunk_document(doc: &FetchedDocument, splitter: &RecursiveSplitter) -> Vec<ContentChunk> {
    let mut chunks: Vec<ContentChunk> = Vec::new();

    for (page_idx, page) in doc.pages.iter().enumerate() {
        let page_number = match doc.kind {
            SourceKind::Pdf => Some(page_idx as u32 + 1),
            SourceKind::Web => None,
        };

        for content in splitter.split(page) {
            chunks.push(ContentChunk {
                content,
                source_url: doc.url.clone(),
                title: doc.title.clone(),
                chunk_index: chunks.len(),
                total_chunks: 0,
                page: page_number,
            });
        }
    }

    let total = chunks.len();
    for chunk in &mut chunks {
        chunk.total_chunks = total;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn document(kind: SourceKind, pages: &[&str]) -> FetchedDocument {
        FetchedDocument {
            url: "https://example.com/catalog.pdf".to_string(),
            title: "Catalog".to_string(),
            kind,
            pages: pages.iter().map(|p| p.to_string()).collect(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_chunk_document_numbers_across_pages() {
        let splitter = RecursiveSplitter::new(20, 0).unwrap();
        let doc = document(
            SourceKind::Pdf,
            &["First page text.\n\nSecond paragraph.", "Last page."],
        );

        let chunks = chunk_document(&doc, &splitter);
        assert_eq!(chunks.len(), 3);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, 3);
            assert_eq!(chunk.title, "Catalog");
        }
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks[1].page, Some(1));
        assert_eq!(chunks[2].page, Some(2));
        assert_eq!(chunks[2].content, "Last page.");
    }

    #[test]
    fn test_web_chunks_have_no_page() {
        let splitter = RecursiveSplitter::new(1000, 200).unwrap();
        let doc = document(SourceKind::Web, &["A short page about advising."]);

        let chunks = chunk_document(&doc, &splitter);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, None);
        assert_eq!(chunks[0].label(), "Catalog (chunk 1/1)");
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        let splitter = RecursiveSplitter::new(100, 10).unwrap();
        let doc = document(SourceKind::Web, &["   \n\n  "]);
        assert!(chunk_document(&doc, &splitter).is_empty());
    }
}

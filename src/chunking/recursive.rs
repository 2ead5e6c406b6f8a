//! Recursive character text splitter.
//!
//! Splits on the coarsest separator present in the text, merges small pieces
//! back together up to the chunk size and recurses into pieces that are still
//! too long with the finer separators.

use crate::config::ChunkingSettings;
use crate::error::{AdvisorError, Result};
use std::collections::VecDeque;

/// Separators tried in order, from paragraphs down to single characters.
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive separator-based splitter. Lengths are counted in characters.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Create a splitter with the default separators.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AdvisorError::InvalidInput(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(AdvisorError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Create a splitter from chunking settings.
    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into trimmed, non-empty chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        if separators.is_empty() {
            return non_empty(text).into_iter().collect();
        }

        // First separator present in the text; the empty separator always matches.
        let mut separator = separators[separators.len() - 1].as_str();
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                finer = &[];
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.extend(non_empty(&piece));
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }

        chunks
    }

    /// Greedily join pieces up to the chunk size, carrying up to
    /// `chunk_overlap` characters of trailing pieces into the next chunk.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |total: usize, window: &VecDeque<&str>| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(total, &window) > self.chunk_size && !window.is_empty() {
                chunks.extend(non_empty(&join(&window, separator)));

                while total > self.chunk_overlap
                    || (joined_len(total, &window) > self.chunk_size && total > 0)
                {
                    let Some(first) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            if !window.is_empty() {
                total += sep_len;
            }
            window.push_back(piece.as_str());
            total += len;
        }

        chunks.extend(non_empty(&join(&window, separator)));
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(window: &VecDeque<&str>, separator: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(separator)
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = RecursiveSplitter::new(1000, 200).unwrap();
        let chunks = splitter.split("  ECON 2105 is required for the major.  ");
        assert_eq!(chunks, vec!["ECON 2105 is required for the major."]);
    }

    #[test]
    fn test_invalid_sizes_are_rejected() {
        assert!(RecursiveSplitter::new(0, 0).is_err());
        assert!(RecursiveSplitter::new(100, 100).is_err());
        assert!(RecursiveSplitter::new(100, 150).is_err());
        assert!(RecursiveSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_words_merge_with_overlap() {
        let splitter = RecursiveSplitter::new(5, 2).unwrap();
        let chunks = splitter.split("a b c d e f g h i j");
        assert_eq!(chunks, vec!["a b c", "c d e", "e f g", "g h i", "i j"]);
    }

    #[test]
    fn test_paragraphs_split_first() {
        let splitter = RecursiveSplitter::new(12, 0).unwrap();
        let chunks = splitter.split("para one.\n\npara two.");
        assert_eq!(chunks, vec!["para one.", "para two."]);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = RecursiveSplitter::new(4, 0).unwrap();
        let chunks = splitter.split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let splitter = RecursiveSplitter::new(50, 10).unwrap();
        let text = "Students must complete the core curriculum before declaring a major. \
                    Prerequisites for upper-division courses are listed in each course description.\n\n\
                    Advisors are available Monday through Friday.\nAppointments can be booked online."
            .repeat(5);

        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 50, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let splitter = RecursiveSplitter::new(3, 0).unwrap();
        let chunks = splitter.split("ééé ééé");
        assert_eq!(chunks, vec!["ééé", "ééé"]);
    }
}

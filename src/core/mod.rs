//! Core document types shared by loading, chunking and indexing.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// One page of extracted PDF text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub number: usize,
    /// Extracted text.
    pub text: String,
}

impl Page {
    /// Creates a page.
    #[must_use]
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }

    /// Returns `true` if the page holds no visible text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A contiguous span of page text, the unit of embedding and retrieval.
///
/// Chunks are created by the splitter and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content, trimmed of surrounding whitespace.
    pub content: String,
    /// 1-based page the chunk came from.
    pub page: usize,
    /// Ordinal within the document.
    pub index: usize,
    /// Character offsets of `content` inside the page text.
    pub char_range: Range<usize>,
}

impl Chunk {
    /// Length of the chunk in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.char_range.len()
    }

    /// First `max_chars` characters of the content on a single line.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .content
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .take(max_chars)
            .collect();
        if self.content.chars().count() > max_chars {
            format!("{flat}...")
        } else {
            flat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_blank() {
        assert!(Page::new(1, " \n\t").is_blank());
        assert!(!Page::new(1, "text").is_blank());
    }

    #[test]
    fn test_chunk_preview() {
        let chunk = Chunk {
            content: "line one\nline two".to_string(),
            page: 1,
            index: 0,
            char_range: 0..17,
        };
        assert_eq!(chunk.preview(8), "line one...");
        assert_eq!(chunk.preview(100), "line one line two");
        assert_eq!(chunk.char_len(), 17);
    }
}

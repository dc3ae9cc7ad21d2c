//! Recursive text splitting into overlapping chunks.
//!
//! Each page is cut at the coarsest boundary that yields pieces no longer
//! than the chunk size: paragraphs, then lines, sentences, words, grapheme
//! clusters and finally single characters. The resulting pieces tile the
//! page exactly and are merged greedily into chunks, carrying a tail of at
//! most `overlap` characters from one chunk into the next.

use std::collections::VecDeque;
use std::ops::Range;

use rayon::prelude::*;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::{Chunk, Page};
use crate::error::ChunkingError;

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// Boundary used to cut a span that is still too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Paragraph,
    Line,
    Sentence,
    Word,
    Grapheme,
    Char,
}

impl Level {
    const fn finer(self) -> Option<Self> {
        match self {
            Self::Paragraph => Some(Self::Line),
            Self::Line => Some(Self::Sentence),
            Self::Sentence => Some(Self::Word),
            Self::Word => Some(Self::Grapheme),
            Self::Grapheme => Some(Self::Char),
            Self::Char => None,
        }
    }

    /// Cuts `piece` into consecutive byte ranges covering all of it.
    fn cut(self, piece: &str) -> Vec<Range<usize>> {
        match self {
            Self::Paragraph => cut_after(piece, "\n\n"),
            Self::Line => cut_after(piece, "\n"),
            Self::Sentence => piece
                .split_sentence_bound_indices()
                .map(|(i, s)| i..i + s.len())
                .collect(),
            Self::Word => piece
                .split_word_bound_indices()
                .map(|(i, s)| i..i + s.len())
                .collect(),
            Self::Grapheme => piece
                .grapheme_indices(true)
                .map(|(i, s)| i..i + s.len())
                .collect(),
            Self::Char => piece
                .char_indices()
                .map(|(i, c)| i..i + c.len_utf8())
                .collect(),
        }
    }
}

/// Splits after every occurrence of `sep`, keeping the separator on the left.
fn cut_after(piece: &str, sep: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, m) in piece.match_indices(sep) {
        let end = i + m.len();
        out.push(start..end);
        start = end;
    }
    if start < piece.len() {
        out.push(start..piece.len());
    }
    out
}

/// A piece of page text that fits in one chunk.
#[derive(Debug, Clone)]
struct Atom {
    bytes: Range<usize>,
    char_start: usize,
    char_len: usize,
}

/// Splits page text into overlapping chunks of bounded length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl RecursiveSplitter {
    /// Creates a splitter.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::InvalidConfig`] if `chunk_size` is zero or
    /// `overlap` is not smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig {
                message: "chunk size must be greater than 0".to_string(),
            });
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig {
                message: format!("overlap ({overlap}) must be less than chunk size ({chunk_size})"),
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Maximum chunk length in characters.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Maximum overlap between consecutive chunks in characters.
    #[must_use]
    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits every page and numbers the chunks in document order.
    ///
    /// Pages are processed in parallel; the output is ordered by page and
    /// then by position within the page.
    #[must_use]
    pub fn split_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        let per_page: Vec<Vec<(String, Range<usize>)>> = pages
            .par_iter()
            .map(|page| self.split_spans(&page.text))
            .collect();

        per_page
            .into_iter()
            .zip(pages)
            .flat_map(|(spans, page)| spans.into_iter().map(move |s| (page.number, s)))
            .enumerate()
            .map(|(index, (page, (content, char_range)))| Chunk {
                content,
                page,
                index,
                char_range,
            })
            .collect()
    }

    /// Splits a single text into chunk contents.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|(content, _)| content)
            .collect()
    }

    fn split_spans(&self, text: &str) -> Vec<(String, Range<usize>)> {
        let mut ranges = Vec::new();
        self.collect_atoms(text, 0..text.len(), Level::Paragraph, &mut ranges);

        let mut char_start = 0;
        let atoms: Vec<Atom> = ranges
            .into_iter()
            .map(|bytes| {
                let char_len = text[bytes.clone()].chars().count();
                let atom = Atom {
                    bytes,
                    char_start,
                    char_len,
                };
                char_start += char_len;
                atom
            })
            .collect();

        self.merge(text, &atoms)
    }

    fn collect_atoms(&self, text: &str, range: Range<usize>, level: Level, out: &mut Vec<Range<usize>>) {
        let piece = &text[range.clone()];
        if piece.chars().count() <= self.chunk_size {
            out.push(range);
            return;
        }
        let Some(finer) = level.finer() else {
            out.push(range);
            return;
        };

        let cuts = level.cut(piece);
        if cuts.len() <= 1 {
            self.collect_atoms(text, range, finer, out);
            return;
        }
        for cut in cuts {
            let abs = range.start + cut.start..range.start + cut.end;
            self.collect_atoms(text, abs, finer, out);
        }
    }

    fn merge(&self, text: &str, atoms: &[Atom]) -> Vec<(String, Range<usize>)> {
        let mut chunks: Vec<(String, Range<usize>)> = Vec::new();
        let mut window: VecDeque<&Atom> = VecDeque::new();
        let mut total = 0usize;

        for atom in atoms {
            if total + atom.char_len > self.chunk_size && !window.is_empty() {
                self.emit(text, &window, &mut chunks);
                while total > self.overlap || (total > 0 && total + atom.char_len > self.chunk_size) {
                    if let Some(front) = window.pop_front() {
                        total -= front.char_len;
                    }
                }
            }
            window.push_back(atom);
            total += atom.char_len;
        }
        if !window.is_empty() {
            self.emit(text, &window, &mut chunks);
        }
        chunks
    }

    #[allow(clippy::unused_self)]
    fn emit(&self, text: &str, window: &VecDeque<&Atom>, chunks: &mut Vec<(String, Range<usize>)>) {
        let (Some(first), Some(last)) = (window.front(), window.back()) else {
            return;
        };
        let raw = &text[first.bytes.start..last.bytes.end];
        let content = raw.trim();
        if content.is_empty() {
            return;
        }

        let leading = raw[..raw.len() - raw.trim_start().len()].chars().count();
        let trailing = raw[raw.trim_end().len()..].chars().count();
        let raw_chars = last.char_start + last.char_len - first.char_start;
        let start = first.char_start + leading;
        let end = first.char_start + raw_chars - trailing;

        // A window that adds only whitespace repeats the previous chunk's tail.
        if let Some((_, prev)) = chunks.last()
            && start >= prev.start
            && end <= prev.end
        {
            return;
        }
        chunks.push((content.to_string(), start..end));
    }
}

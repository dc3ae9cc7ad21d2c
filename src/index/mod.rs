//! In-memory vector index over the chunks of one document.

pub mod indexer;
pub mod retriever;

use rayon::prelude::*;

use crate::core::Chunk;
use crate::error::IndexError;

pub use indexer::DocumentIndexer;
pub use retriever::Retriever;

/// Cosine similarity of two vectors; 0.0 if either has zero norm or the
/// lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    /// The matching chunk.
    pub chunk: &'a Chunk,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Chunks of a single document with their embeddings, in insertion order.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    source: String,
    dimension: Option<usize>,
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl VectorIndex {
    /// Creates an empty index for the document labelled `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dimension: None,
            entries: Vec::new(),
        }
    }

    /// Label of the indexed document.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Embedding dimension, fixed by the first insert.
    #[must_use]
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of indexed chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(chunk, _)| chunk)
    }

    /// Adds a chunk with its embedding.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Dimension`] if `embedding` differs in length
    /// from the vectors already stored.
    pub fn insert(&mut self, chunk: Chunk, embedding: Vec<f32>) -> Result<(), IndexError> {
        match self.dimension {
            Some(expected) if expected != embedding.len() => {
                return Err(IndexError::Dimension {
                    expected,
                    actual: embedding.len(),
                });
            }
            Some(_) => {}
            None => self.dimension = Some(embedding.len()),
        }
        self.entries.push((chunk, embedding));
        Ok(())
    }

    /// Returns the `k` chunks most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    #[must_use]
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .par_iter()
            .enumerate()
            .map(|(i, (_, v))| (i, cosine_similarity(query, v)))
            .collect();

        // Stable sort keeps insertion order for ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: &self.entries[i].0,
                score,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn chunk(index: usize, content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            page: 1,
            index,
            char_range: 0..content.chars().count(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_dimension_fixed_by_first_insert() {
        let mut index = VectorIndex::new("doc.pdf");
        assert!(index.dimension().is_none());
        index
            .insert(chunk(0, "a"), vec![1.0, 0.0])
            .unwrap_or_else(|e| panic!("insert failed: {e}"));
        assert_eq!(index.dimension(), Some(2));
        let err = index.insert(chunk(1, "b"), vec![1.0, 0.0, 0.0]);
        assert!(matches!(
            err,
            Err(IndexError::Dimension {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_search_ranks_and_truncates() {
        let mut index = VectorIndex::new("doc.pdf");
        for (i, v) in [[0.0, 1.0], [1.0, 0.0], [0.7, 0.7]].into_iter().enumerate() {
            index
                .insert(chunk(i, &format!("c{i}")), v.to_vec())
                .unwrap_or_else(|e| panic!("insert failed: {e}"));
        }
        let hits = index.similarity_search(&[1.0, 0.0], 2);
        let names: Vec<&str> = hits.iter().map(|h| h.chunk.content.as_str()).collect();
        assert_eq!(names, vec!["c1", "c2"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut index = VectorIndex::new("doc.pdf");
        for i in 0..4 {
            index
                .insert(chunk(i, &format!("c{i}")), vec![1.0, 0.0])
                .unwrap_or_else(|e| panic!("insert failed: {e}"));
        }
        let hits = index.similarity_search(&[1.0, 0.0], 4);
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_index_search() {
        let index = VectorIndex::new("empty.pdf");
        assert!(index.is_empty());
        assert!(index.similarity_search(&[1.0], 5).is_empty());
    }
}

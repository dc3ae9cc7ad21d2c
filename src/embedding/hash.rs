//! Deterministic hashed bag-of-words embedder.
//!
//! Tokens are lowercased Unicode words hashed into a fixed number of signed
//! buckets, then L2-normalised. Texts sharing vocabulary score high under
//! cosine similarity, which is enough for offline runs and tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use super::Embedder;
use crate::error::EmbeddingError;

/// Model name reported by [`HashEmbedder`].
pub const HASH_MODEL: &str = "hash-bow";
/// Default vector length.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Local embedder with no network dependency.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of `dimensions` entries.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embeds one text synchronously.
    #[must_use]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions.max(1)];
        for word in text.unicode_words() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (h % v.len() as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        HASH_MODEL
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let e = HashEmbedder::default();
        assert_eq!(e.embed("Bolsa Família"), e.embed("bolsa família"));
    }

    #[test]
    fn test_normalised() {
        let v = HashEmbedder::default().embed("one two three");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = HashEmbedder::new(8).embed("  ");
        assert_eq!(v, vec![0.0; 8]);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let e = HashEmbedder::default();
        let q = e.embed("social programs budget");
        let near = e.embed("the budget of social programs grew");
        let far = e.embed("weather forecast for tomorrow");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }
}

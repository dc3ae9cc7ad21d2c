//! Query-time retrieval over a [`VectorIndex`].

use std::sync::Arc;

use super::VectorIndex;
use crate::embedding::Embedder;
use crate::error::EmbeddingError;

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Separator placed between retrieved chunks.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

/// Embeds a query and returns the closest chunks as one text block.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("source", &self.index.source())
            .field("chunks", &self.index.len())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl Retriever {
    /// Creates a retriever. `embedder` must be the one the index was built with.
    #[must_use]
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    /// Number of chunks returned per query.
    #[must_use]
    pub const fn top_k(&self) -> usize {
        self.top_k
    }

    /// Returns the `top_k` most similar chunk texts joined by blank lines,
    /// most similar first. An empty index yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] if the query cannot be embedded.
    pub async fn retrieve(&self, query: &str) -> Result<String, EmbeddingError> {
        if self.index.is_empty() {
            return Ok(String::new());
        }
        let vector = self.embedder.embed_query(query).await?;
        let hits = self.index.similarity_search(&vector, self.top_k);
        tracing::debug!(query, hits = hits.len(), "retrieved passages");
        Ok(hits
            .iter()
            .map(|h| h.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR))
    }
}

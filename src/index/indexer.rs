//! Builds a [`VectorIndex`] from a PDF.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::VectorIndex;
use crate::chunking::RecursiveSplitter;
use crate::core::Page;
use crate::embedding::Embedder;
use crate::error::{EmbeddingError, IndexError};
use crate::io::load_pdf_pages;

/// Default number of chunks sent to the embedder per request.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// Loads, splits and embeds one document into a fresh index.
#[derive(Clone)]
pub struct DocumentIndexer {
    splitter: RecursiveSplitter,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl std::fmt::Debug for DocumentIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndexer")
            .field("splitter", &self.splitter)
            .field("embedder", &self.embedder.model())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl DocumentIndexer {
    /// Creates an indexer. A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(splitter: RecursiveSplitter, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            splitter,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// The embedder shared with retrieval.
    #[must_use]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Indexes the PDF at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the document cannot be loaded or embedding
    /// fails. No partial index is returned.
    pub async fn index_document(&self, path: &Path) -> Result<VectorIndex, IndexError> {
        let pages = load_pdf_pages(path)?;
        self.index_pages(&path.display().to_string(), &pages).await
    }

    /// Indexes already extracted pages under the label `source`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if embedding fails.
    pub async fn index_pages(&self, source: &str, pages: &[Page]) -> Result<VectorIndex, IndexError> {
        let chunks = self.splitter.split_pages(pages);
        info!(source, pages = pages.len(), chunks = chunks.len(), "indexing document");

        let mut index = VectorIndex::new(source);
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_documents(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                }
                .into());
            }
            for (chunk, vector) in batch.iter().cloned().zip(vectors) {
                index.insert(chunk, vector)?;
            }
            debug!(indexed = index.len(), "embedded batch");
        }

        Ok(index)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct CountingEmbedder {
        calls: AtomicUsize,
        drop_one: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model(&self) -> &str {
            "counting"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = if self.drop_one { texts.len() - 1 } else { texts.len() };
            Ok(vec![vec![1.0, 0.0]; n])
        }
    }

    fn splitter() -> RecursiveSplitter {
        RecursiveSplitter::new(20, 0).unwrap_or_else(|e| panic!("splitter: {e}"))
    }

    fn pages() -> Vec<Page> {
        vec![
            Page::new(1, "Social programs support families in need."),
            Page::new(2, "The budget grew by ten percent last year."),
        ]
    }

    #[tokio::test]
    async fn test_index_pages_batches() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            drop_one: false,
        });
        let indexer = DocumentIndexer::new(splitter(), embedder.clone(), 2);
        let index = indexer
            .index_pages("doc.pdf", &pages())
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));

        let expected_calls = index.len().div_ceil(2);
        assert!(index.len() >= 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), expected_calls);
        assert_eq!(index.source(), "doc.pdf");
    }

    #[tokio::test]
    async fn test_count_mismatch_builds_nothing() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            drop_one: true,
        });
        let indexer = DocumentIndexer::new(splitter(), embedder, 4);
        let result = indexer.index_pages("doc.pdf", &pages()).await;
        assert!(matches!(
            result,
            Err(IndexError::Embedding(EmbeddingError::CountMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_empty_document_gives_empty_index() {
        let indexer = DocumentIndexer::new(splitter(), Arc::new(HashEmbedder::default()), 8);
        let index = indexer
            .index_pages("blank.pdf", &[Page::new(1, "   ")])
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_non_pdf_builds_no_index() {
        let file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile: {e}"));
        std::fs::write(file.path(), "plain text").unwrap_or_else(|e| panic!("write: {e}"));
        let indexer = DocumentIndexer::new(splitter(), Arc::new(HashEmbedder::default()), 8);
        let result = indexer.index_document(file.path()).await;
        assert!(matches!(result, Err(IndexError::Document(_))));
    }
}

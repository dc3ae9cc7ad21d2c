//! Text embedding backends.
//!
//! The indexer and the retriever share one [`Embedder`] so queries and
//! chunks are projected into the same vector space.

pub mod hash;
pub mod openai;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::config::AgentConfig;
use crate::error::{AgentError, EmbeddingError};

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

/// Produces embedding vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Embeds a batch of texts, returning one vector per input in order.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] if the backend fails or returns a
    /// different number of vectors than inputs.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embeds a single query.
    ///
    /// # Errors
    ///
    /// Same as [`Embedder::embed_documents`].
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            Some(_) => Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len() + 1,
            }),
            None => Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            }),
        }
    }
}

/// Available embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedderKind {
    /// OpenAI-compatible `/embeddings` endpoint.
    #[default]
    OpenAi,
    /// Local hashed bag-of-words vectors; needs no network access.
    Hash,
}

impl FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "remote" => Ok(Self::OpenAi),
            "hash" | "local" => Ok(Self::Hash),
            other => Err(format!("unknown embedder '{other}' (expected openai or hash)")),
        }
    }
}

/// Creates the embedder selected by `kind`.
///
/// # Errors
///
/// Returns [`AgentError::ApiKeyMissing`] if a remote embedder is requested
/// with an empty API key.
pub fn create_embedder(
    config: &AgentConfig,
    kind: EmbedderKind,
) -> Result<Arc<dyn Embedder>, AgentError> {
    match kind {
        EmbedderKind::OpenAi => {
            if config.api_key.trim().is_empty() {
                return Err(AgentError::ApiKeyMissing);
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        EmbedderKind::Hash => Ok(Arc::new(HashEmbedder::default())),
    }
}

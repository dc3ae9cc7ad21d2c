//! Embeddings through an OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::agent::config::AgentConfig;
use crate::agent::providers::http::ApiClient;
use crate::error::{AgentError, EmbeddingError};

/// Remote embedder for Mistral and other OpenAI-compatible servers.
///
/// Sends the whole input slice as one request; batching is the caller's
/// concern. Rate limits are reported, not retried.
pub struct OpenAiEmbedder {
    api: ApiClient,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedder {
    /// Creates an embedder from agent configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] if the HTTP client cannot be built.
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        Ok(Self {
            api: ApiClient::new(config)?,
            model: config.embedding_model.clone(),
        })
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response: EmbeddingResponse = self.api.post_json("embeddings", &request).await?;

        let mut data = response.data;
        data.sort_by_key(|entry| entry.index);
        if data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: data.len(),
            });
        }
        if data.iter().any(|entry| entry.embedding.is_empty()) {
            return Err(EmbeddingError::Empty);
        }

        tracing::debug!(model = %self.model, inputs = texts.len(), "embedded batch");
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }
}

//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → credentials →
//! environment variables → defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, RecursiveSplitter};
use crate::credentials::{Credentials, PROVIDER_API_KEY};
use crate::error::{AgentError, ChunkingError};
use crate::index::indexer::DEFAULT_EMBEDDING_BATCH_SIZE;
use crate::index::retriever::DEFAULT_TOP_K;

use super::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";
/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "mistral-large-latest";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "mistral-embed";
/// Default max tokens per completion.
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Default per-question deadline in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default maximum tool-calling loop iterations.
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
/// Default retrieve rounds before the document agent generates.
const DEFAULT_DOCUMENT_TOOL_ROUNDS: usize = 1;

/// Which tool outputs feed the answer prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// Only the most recent tool message.
    #[default]
    LatestToolOutput,
    /// All tool messages, oldest first.
    Accumulate,
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "latest" | "latest-tool-output" => Ok(Self::LatestToolOutput),
            "accumulate" | "all" => Ok(Self::Accumulate),
            other => Err(format!(
                "unknown context mode '{other}' (expected latest or accumulate)"
            )),
        }
    }
}

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Model for chat completions.
    pub chat_model: String,
    /// Model for embeddings.
    pub embedding_model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Overall deadline for one question, retries included.
    pub timeout: Duration,
    /// Attempts per question while rate limited.
    pub max_attempts: usize,
    /// Pause between rate-limited attempts.
    pub retry_delay: Duration,
    /// Maximum tool-calling loop iterations before aborting.
    pub max_tool_iterations: usize,
    /// Retrieve rounds before the document agent generates.
    pub document_tool_rounds: usize,
    /// Passages returned by the retrieve tool.
    pub retrieval_top_k: usize,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,
    /// Texts per embedding request.
    pub embedding_batch_size: usize,
    /// Context assembly for answer generation.
    pub context_mode: ContextMode,
    /// Directory containing prompt template files.
    ///
    /// When set, system prompts are loaded from markdown files in this
    /// directory, falling back to compiled-in defaults for missing files.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Retry policy for rate-limited runs.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay)
    }

    /// Splitter for the configured chunk size and overlap.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::InvalidConfig`] if the overlap is not
    /// smaller than the chunk size.
    pub fn splitter(&self) -> Result<RecursiveSplitter, ChunkingError> {
        RecursiveSplitter::new(self.chunk_size, self.chunk_overlap)
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    chat_model: Option<String>,
    embedding_model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    max_attempts: Option<usize>,
    retry_delay: Option<Duration>,
    max_tool_iterations: Option<usize>,
    document_tool_rounds: Option<usize>,
    retrieval_top_k: Option<usize>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    embedding_batch_size: Option<usize>,
    context_mode: Option<ContextMode>,
    prompt_dir: Option<PathBuf>,
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AgentConfigBuilder {
    /// Populates an unset API key from loaded credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: &Credentials) -> Self {
        if self.api_key.is_none() {
            self.api_key = credentials.provider_api_key().map(str::to_string);
        }
        self
    }

    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = non_empty_var("DOCQUERY_PROVIDER");
        }
        if self.api_key.is_none() {
            self.api_key =
                non_empty_var(PROVIDER_API_KEY).or_else(|| non_empty_var("DOCQUERY_API_KEY"));
        }
        if self.base_url.is_none() {
            self.base_url = non_empty_var("DOCQUERY_BASE_URL");
        }
        if self.chat_model.is_none() {
            self.chat_model = non_empty_var("DOCQUERY_CHAT_MODEL");
        }
        if self.embedding_model.is_none() {
            self.embedding_model = non_empty_var("DOCQUERY_EMBEDDING_MODEL");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = non_empty_var("DOCQUERY_PROMPT_DIR").map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the max tokens per completion.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the per-question deadline.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the number of attempts while rate limited.
    #[must_use]
    pub const fn max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Sets the delay between rate-limited attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the maximum tool-calling loop iterations.
    #[must_use]
    pub const fn max_tool_iterations(mut self, n: usize) -> Self {
        self.max_tool_iterations = Some(n);
        self
    }

    /// Sets the retrieve rounds before generation.
    #[must_use]
    pub const fn document_tool_rounds(mut self, n: usize) -> Self {
        self.document_tool_rounds = Some(n);
        self
    }

    /// Sets the number of retrieved passages.
    #[must_use]
    pub const fn retrieval_top_k(mut self, n: usize) -> Self {
        self.retrieval_top_k = Some(n);
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n);
        self
    }

    /// Sets the chunk overlap.
    #[must_use]
    pub const fn chunk_overlap(mut self, n: usize) -> Self {
        self.chunk_overlap = Some(n);
        self
    }

    /// Sets the embedding batch size.
    #[must_use]
    pub const fn embedding_batch_size(mut self, n: usize) -> Self {
        self.embedding_batch_size = Some(n);
        self
    }

    /// Sets the context mode.
    #[must_use]
    pub const fn context_mode(mut self, mode: ContextMode) -> Self {
        self.context_mode = Some(mode);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no non-empty API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: self
                .chat_model
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            temperature: self.temperature.unwrap_or(0.0),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            max_tool_iterations: self
                .max_tool_iterations
                .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS),
            document_tool_rounds: self
                .document_tool_rounds
                .unwrap_or(DEFAULT_DOCUMENT_TOOL_ROUNDS),
            retrieval_top_k: self.retrieval_top_k.unwrap_or(DEFAULT_TOP_K),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: self.chunk_overlap.unwrap_or(DEFAULT_OVERLAP),
            embedding_batch_size: self
                .embedding_batch_size
                .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE),
            context_mode: self.context_mode.unwrap_or_default(),
            prompt_dir: self.prompt_dir,
        })
    }
}

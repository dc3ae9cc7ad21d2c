//! Error types for docquery.
//!
//! Each layer owns a `thiserror` enum; the top-level [`Error`] unifies them
//! for callers that only need to report a failure.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential loading failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Document loading failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Indexing failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Embedding service failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Database access failed.
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// Agent execution failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure outside the layers above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading the credentials file.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The file could not be read or parsed.
    #[error("failed to read credentials from {}: {message}", path.display())]
    Read {
        /// Credentials file path.
        path: PathBuf,
        /// Underlying parser message.
        message: String,
    },

    /// A required key is absent or empty.
    #[error("missing credential '{key}' in {}", path.display())]
    Missing {
        /// The first required key that was not found.
        key: String,
        /// Credentials file path.
        path: PathBuf,
    },
}

/// Errors raised while loading a source document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document is unreadable or not a valid PDF.
    #[error("failed to load document {}: {message}", path.display())]
    Load {
        /// Document path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
}

/// Errors raised by the text splitter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Chunk size and overlap are inconsistent.
    #[error("invalid chunking configuration: {message}")]
    InvalidConfig {
        /// Explanation of the constraint that failed.
        message: String,
    },
}

/// Errors raised by an embedding backend.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The provider rejected the request with a rate limit.
    #[error("embedding provider rate limited: {message}")]
    RateLimited {
        /// Provider message.
        message: String,
    },

    /// Any other provider failure.
    #[error("embedding provider error: {message}")]
    Provider {
        /// Provider message.
        message: String,
    },

    /// The provider returned a different number of vectors than inputs.
    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of inputs sent.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },

    /// The provider returned an empty vector.
    #[error("embedding provider returned an empty vector")]
    Empty,
}

impl EmbeddingError {
    /// Returns `true` if this error is a transient rate limit.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Errors raised while building a vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Document could not be loaded.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Splitter configuration was rejected.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// Embedding service failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// A vector's dimension differs from the index dimension.
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    Dimension {
        /// Dimension fixed by the first insert.
        expected: usize,
        /// Dimension of the rejected vector.
        actual: usize,
    },
}

/// Errors raised by the SQL layer.
#[derive(Debug, Error)]
pub enum SqlError {
    /// Connection could not be opened.
    #[error("failed to open database {url}: {message}")]
    Open {
        /// Connection string.
        url: String,
        /// Driver message.
        message: String,
    },

    /// Statement failed in the database.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Statement was refused by the query guard.
    #[error("query rejected: {reason}")]
    Rejected {
        /// Why the guard refused the statement.
        reason: String,
    },

    /// A table outside the allow-list was referenced.
    #[error("table '{table}' is not available; only '{allowed}' may be queried")]
    TableNotAllowed {
        /// Referenced table.
        table: String,
        /// The single allowed table.
        allowed: String,
    },

    /// The connection lock was poisoned by a panicking holder.
    #[error("database connection lock poisoned")]
    Lock,
}

/// Errors raised by the agent system.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key configured.
    #[error("no API key configured (set MISTRAL_API_KEY or DOCQUERY_API_KEY)")]
    ApiKeyMissing,

    /// Unknown provider name.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name that was requested.
        name: String,
    },

    /// The provider API returned an error.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider message.
        message: String,
        /// HTTP status when known.
        status: Option<u16>,
    },

    /// The provider rejected the request with a rate limit (HTTP 429).
    #[error("rate limited by provider: {message}")]
    RateLimited {
        /// Provider message.
        message: String,
    },

    /// A tool could not be executed.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// The model kept requesting tools past the iteration budget.
    #[error("tool loop exceeded {max_iterations} iterations")]
    ToolLoopExceeded {
        /// Configured budget.
        max_iterations: usize,
    },

    /// The overall per-question deadline expired.
    #[error("deadline of {}s exceeded", timeout.as_secs())]
    DeadlineExceeded {
        /// Configured deadline.
        timeout: Duration,
    },

    /// A question could not be answered. Carries the original failure.
    #[error("failed to process the question: {message}")]
    QueryProcessing {
        /// Display text of the original failure.
        message: String,
        /// The original failure.
        #[source]
        source: Box<Self>,
    },
}

impl AgentError {
    /// Returns `true` if this error is a transient rate limit.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Wraps this error as [`AgentError::QueryProcessing`], preserving its text.
    #[must_use]
    pub fn into_query_processing(self) -> Self {
        match self {
            already @ Self::QueryProcessing { .. } => already,
            other => Self::QueryProcessing {
                message: other.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Errors raised by CLI command handlers.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command could not complete.
    #[error("{0}")]
    ExecutionFailed(String),
}

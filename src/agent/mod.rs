//! Tool-calling agents for docquery.
//!
//! Two agents share one provider abstraction backed by OpenAI-compatible
//! APIs:
//!
//! ```text
//! Document question → DocumentAgent
//!   ├── Deciding: model sees the `retrieve` tool
//!   ├── ToolCall → ToolExecuted: top-k passages from the VectorIndex
//!   └── Generating: answer prompt + retrieved context
//!
//! Database question → DatabaseAgent
//!   └── agentic loop over the SQL toolkit (list, schema, check, query)
//! ```
//!
//! Both runs are wrapped by [`retry::RetryPolicy`], which retries rate
//! limits and reports every other failure as
//! [`AgentError::QueryProcessing`](crate::error::AgentError::QueryProcessing).

pub mod agentic_loop;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod database;
pub mod document;
pub mod executor;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod state;
pub mod tool;
pub mod traits;

// Re-export key types
pub use checkpoint::MemoryCheckpointer;
pub use client::create_provider;
pub use config::{AgentConfig, ContextMode};
pub use database::{DatabaseAgent, NO_ANSWER_SENTINEL};
pub use document::{DEFAULT_THREAD_ID, DocumentAgent};
pub use executor::{RetrievalTools, SqlTools, ToolExecutor};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Conversation, Role, TokenUsage};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use retry::RetryPolicy;
pub use state::{AgentAnswer, AgentState, AgentStep, RunLog, StepOutcome};
pub use tool::{ToolCall, ToolDefinition, ToolResult, ToolSet};
pub use traits::{Agent, execute_with_tools};

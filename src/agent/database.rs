//! Question answering over a single database table.

use std::sync::Arc;

use tracing::{debug, info};

use super::config::AgentConfig;
use super::executor::SqlTools;
use super::message::Conversation;
use super::provider::LlmProvider;
use super::state::{AgentAnswer, RunLog};
use super::traits::{Agent, execute_with_tools};
use crate::error::AgentError;
use crate::sql::SqlDatabase;

/// Answer returned when the agent produced no text.
pub const NO_ANSWER_SENTINEL: &str = "Unable to obtain an answer from the agent.";

/// Runs the SQL toolkit in an agentic loop.
pub struct DatabaseAgent {
    provider: Arc<dyn LlmProvider>,
    db: Arc<SqlDatabase>,
    config: AgentConfig,
    system_prompt: String,
}

impl std::fmt::Debug for DatabaseAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseAgent")
            .field("provider", &self.provider.name())
            .field("table", &self.db.config().table)
            .finish_non_exhaustive()
    }
}

impl Agent for DatabaseAgent {
    fn name(&self) -> &'static str {
        "database"
    }

    fn model(&self) -> &str {
        &self.config.chat_model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        self.config.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }

    fn max_tool_iterations(&self) -> usize {
        self.config.max_tool_iterations
    }
}

impl DatabaseAgent {
    /// Creates an agent. `system_prompt` should already name the table.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        db: Arc<SqlDatabase>,
        config: AgentConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            db,
            config,
            system_prompt: system_prompt.into(),
        }
    }

    /// Answers `question` from the database, retrying on rate limits
    /// within the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::QueryProcessing`] wrapping the failure that
    /// ended the run.
    pub async fn answer_from_database(&self, question: &str) -> Result<AgentAnswer, AgentError> {
        info!(agent = self.name(), table = %self.db.config().table, "answering question");
        let answer = self
            .config
            .retry_policy()
            .run_with_deadline(self.config.timeout, |attempt| {
                debug!(attempt, "database agent attempt");
                self.answer(question)
            })
            .await?;
        info!(
            agent = self.name(),
            tool_calls = answer.tool_calls,
            total_tokens = answer.usage.total_tokens,
            "answer ready"
        );
        Ok(answer)
    }

    /// Runs one attempt with fresh tool state.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, [`AgentError::ToolExecution`] for an
    /// infrastructure failure, or [`AgentError::ToolLoopExceeded`].
    pub async fn answer(&self, question: &str) -> Result<AgentAnswer, AgentError> {
        let tools = SqlTools::new(Arc::clone(&self.db));
        let mut log = RunLog::default();
        let messages =
            execute_with_tools(self, self.provider.as_ref(), question, &tools, &mut log).await?;
        let conversation = Conversation::with_history(self.name(), messages);
        let answer = conversation
            .last_assistant_text()
            .unwrap_or(NO_ANSWER_SENTINEL)
            .to_string();
        Ok(log.finish(answer))
    }
}

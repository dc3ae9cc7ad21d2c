//! Retrieval-augmented answering over one indexed document.
//!
//! One attempt walks an explicit state machine:
//!
//! ```text
//! Deciding ──(no tool calls)──────────────────────────────► Done
//!    │                                                       ▲
//!    └─(tool calls)─► ToolCall ─► ToolExecuted ─► Generating ┘
//!                                      │
//!                                      └─(rounds left)─► Deciding
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use super::checkpoint::MemoryCheckpointer;
use super::config::{AgentConfig, ContextMode};
use super::executor::{RetrievalTools, ToolExecutor};
use super::message::{
    ChatMessage, Conversation, Role, assistant_message, assistant_tool_calls_message,
    system_message, tool_message, user_message,
};
use super::provider::LlmProvider;
use super::state::{AgentAnswer, AgentState, RunLog, StepOutcome};
use super::tool::ToolCall;
use super::traits::Agent;
use crate::error::AgentError;
use crate::index::retriever::PASSAGE_SEPARATOR;

/// Thread used when the caller does not pick one.
pub const DEFAULT_THREAD_ID: &str = "chat-tese";

/// Answers questions about a document through the `retrieve` tool.
pub struct DocumentAgent {
    provider: Arc<dyn LlmProvider>,
    tools: RetrievalTools,
    config: AgentConfig,
    answer_prompt: String,
    checkpointer: Option<Arc<MemoryCheckpointer>>,
    thread_id: String,
}

impl std::fmt::Debug for DocumentAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentAgent")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl Agent for DocumentAgent {
    fn name(&self) -> &'static str {
        "document"
    }

    fn model(&self) -> &str {
        &self.config.chat_model
    }

    fn system_prompt(&self) -> &str {
        &self.answer_prompt
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

impl DocumentAgent {
    /// Creates an agent without memory between questions.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: RetrievalTools,
        config: AgentConfig,
        answer_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
            answer_prompt: answer_prompt.into(),
            checkpointer: None,
            thread_id: DEFAULT_THREAD_ID.to_string(),
        }
    }

    /// Continues `thread_id` across questions using `checkpointer`.
    #[must_use]
    pub fn with_checkpointer(
        mut self,
        checkpointer: Arc<MemoryCheckpointer>,
        thread_id: impl Into<String>,
    ) -> Self {
        self.checkpointer = Some(checkpointer);
        self.thread_id = thread_id.into();
        self
    }

    /// Answers `question`, retrying on rate limits within the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::QueryProcessing`] wrapping the failure that
    /// ended the run.
    pub async fn answer_question(&self, question: &str) -> Result<AgentAnswer, AgentError> {
        info!(agent = self.name(), thread = %self.thread_id, "answering question");
        let answer = self
            .config
            .retry_policy()
            .run_with_deadline(self.config.timeout, |attempt| {
                debug!(attempt, "document agent attempt");
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

    /// Runs one attempt of the state machine.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, [`AgentError::RateLimited`] when the
    /// embedder throttles, or [`AgentError::ToolExecution`] for a failed
    /// tool call.
    pub async fn answer(&self, question: &str) -> Result<AgentAnswer, AgentError> {
        let history = self
            .checkpointer
            .as_ref()
            .map(|c| c.load(&self.thread_id))
            .unwrap_or_default();
        let mut conversation = Conversation::with_history(self.thread_id.clone(), history);
        let run_start = conversation.messages.len();
        conversation.push(user_message(question));

        let mut log = RunLog::default();
        let mut state = AgentState::Deciding;
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut rounds = 0usize;
        let mut turns = 0usize;
        let mut final_text = String::new();

        loop {
            debug!(?state, rounds, "document agent state");
            state = match state {
                AgentState::Deciding => {
                    let request = self.request(conversation.messages.clone(), self.tools.definitions());
                    let response = self.provider.chat(&request).await?;
                    log.record_turn(turns, &response);
                    turns += 1;
                    match StepOutcome::from_response(&response) {
                        StepOutcome::ContinueWithToolCall(calls) => {
                            conversation
                                .push(assistant_tool_calls_message(&response.content, calls.clone()));
                            pending = calls;
                            AgentState::ToolCall
                        }
                        StepOutcome::FinalAnswer(text) if rounds == 0 => {
                            conversation.push(assistant_message(&text));
                            final_text = text;
                            AgentState::Done
                        }
                        StepOutcome::FinalAnswer(_) => AgentState::Generating,
                    }
                }
                AgentState::ToolCall => {
                    for call in pending.drain(..) {
                        let result = self.tools.execute(&call).await?;
                        log.record_tool(&call, &result);
                        conversation.push(tool_message(&result.tool_call_id, &result.content));
                    }
                    rounds += 1;
                    AgentState::ToolExecuted
                }
                AgentState::ToolExecuted => {
                    if rounds < self.config.document_tool_rounds {
                        AgentState::Deciding
                    } else {
                        AgentState::Generating
                    }
                }
                AgentState::Generating => {
                    let request = self.request(
                        self.generation_messages(&conversation, run_start),
                        Vec::new(),
                    );
                    let response = self.provider.chat(&request).await?;
                    log.record_generation(&response);
                    conversation.push(assistant_message(&response.content));
                    final_text = response.content;
                    AgentState::Done
                }
                AgentState::Done => break,
            };
        }

        if let Some(checkpointer) = &self.checkpointer {
            checkpointer.save(&self.thread_id, conversation.messages);
        }
        Ok(log.finish(final_text))
    }

    /// Tool output of the current run, per the configured context mode.
    fn context(&self, conversation: &Conversation, run_start: usize) -> String {
        let mut outputs = conversation.tool_outputs_since(run_start);
        match self.config.context_mode {
            ContextMode::LatestToolOutput => outputs.next_back().unwrap_or_default().to_string(),
            ContextMode::Accumulate => outputs.collect::<Vec<_>>().join(PASSAGE_SEPARATOR),
        }
    }

    /// System prompt with context, then the conversation without tool traffic.
    fn generation_messages(&self, conversation: &Conversation, run_start: usize) -> Vec<ChatMessage> {
        let system = format!(
            "{}\n\n{}",
            self.answer_prompt,
            self.context(conversation, run_start)
        );
        std::iter::once(system_message(&system))
            .chain(
                conversation
                    .messages
                    .iter()
                    .filter(|m| match m.role {
                        Role::User | Role::System => true,
                        Role::Assistant => !m.is_tool_request(),
                        Role::Tool => false,
                    })
                    .cloned(),
            )
            .collect()
    }
}

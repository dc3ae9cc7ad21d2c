//! Agent trait definition.
//!
//! Both agents implement this trait, which fixes their model settings and
//! system prompt and builds their chat requests.

use super::agentic_loop::agentic_loop;
use super::executor::ToolExecutor;
use super::message::{ChatMessage, ChatRequest, system_message, user_message};
use super::provider::LlmProvider;
use super::state::RunLog;
use super::tool::ToolDefinition;
use crate::error::AgentError;

/// Trait implemented by all agents in the system.
///
/// Agents encapsulate a specific role with a fixed system prompt and model
/// configuration. Tool-using agents run through [`execute_with_tools`].
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Maximum tool-calling loop iterations before aborting.
    fn max_tool_iterations(&self) -> usize {
        10
    }

    /// Builds a request over `messages` with this agent's model settings.
    fn request(&self, messages: Vec<ChatMessage>, tools: Vec<ToolDefinition>) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            tools,
        }
    }
}

/// Executes an agent with tool-calling support.
///
/// Starts from the agent's system prompt and `user_msg`, runs the agentic
/// loop over `executor`'s tools, and returns the whole conversation,
/// including the final assistant message.
///
/// # Errors
///
/// Returns [`AgentError`] on API failures, tool execution errors,
/// or if the tool loop exceeds the agent's max iterations.
pub async fn execute_with_tools(
    agent: &dyn Agent,
    provider: &dyn LlmProvider,
    user_msg: &str,
    executor: &dyn ToolExecutor,
    log: &mut RunLog,
) -> Result<Vec<ChatMessage>, AgentError> {
    let mut request = agent.request(
        vec![system_message(agent.system_prompt()), user_message(user_msg)],
        executor.definitions(),
    );

    let response = agentic_loop(
        provider,
        &mut request,
        executor,
        agent.max_tool_iterations(),
        log,
    )
    .await?;

    let mut messages = request.messages;
    messages.push(super::message::assistant_message(&response.content));
    Ok(messages)
}

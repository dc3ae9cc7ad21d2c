//! Agentic tool-calling loop.
//!
//! Drives the LLM ↔ tool execution round-trip: sends a request to the model,
//! executes any tool calls in the response, appends results, and repeats
//! until the model produces a final text response or the iteration limit
//! is reached.

use tracing::debug;

use super::executor::ToolExecutor;
use super::message::{ChatRequest, ChatResponse, assistant_tool_calls_message, tool_message};
use super::provider::LlmProvider;
use super::state::RunLog;
use crate::error::AgentError;

/// Runs an agentic loop: model → tool calls → tool results → model → …
///
/// Continues until the model responds without tool calls (i.e., it produces
/// a final text answer) or `max_iterations` is reached. Every model turn and
/// tool execution is recorded in `log`, which also sums token usage.
///
/// # Arguments
///
/// * `provider` - LLM provider to call.
/// * `request` - Initial chat request (mutated in-place with tool messages).
/// * `executor` - Dispatches tool calls.
/// * `max_iterations` - Safety limit on round-trips.
/// * `log` - Step record for the current attempt.
///
/// # Errors
///
/// Returns [`AgentError::ToolLoopExceeded`] if the model keeps requesting
/// tools beyond `max_iterations`. Propagates provider and executor errors.
pub async fn agentic_loop(
    provider: &dyn LlmProvider,
    request: &mut ChatRequest,
    executor: &dyn ToolExecutor,
    max_iterations: usize,
    log: &mut RunLog,
) -> Result<ChatResponse, AgentError> {
    for iteration in 0..max_iterations {
        let response = provider.chat(request).await?;
        log.record_turn(iteration, &response);

        // If no tool calls, we have a final answer
        if response.tool_calls.is_empty() {
            debug!(iteration, "agentic loop completed with final text response");
            return Ok(response);
        }

        debug!(
            iteration,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );

        request.messages.push(assistant_tool_calls_message(
            &response.content,
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            let result = executor.execute(call).await?;
            debug!(
                tool = call.name,
                call_id = call.id,
                is_error = result.is_error,
                "tool execution complete"
            );
            log.record_tool(call, &result);
            request
                .messages
                .push(tool_message(&result.tool_call_id, &result.content));
        }
    }

    Err(AgentError::ToolLoopExceeded { max_iterations })
}

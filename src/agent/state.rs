//! Agent run state, step records and the final answer.

use serde::Serialize;

use super::message::{ChatResponse, TokenUsage};
use super::tool::{ToolCall, ToolResult};

/// Phase of the document agent's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// The model decides whether to call a tool.
    Deciding,
    /// Requested tool calls are pending execution.
    ToolCall,
    /// Tool results have been appended to the conversation.
    ToolExecuted,
    /// The final answer is being composed from the tool context.
    Generating,
    /// The run has finished.
    Done,
}

/// What the model chose at a decision point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run these tools before answering.
    ContinueWithToolCall(Vec<ToolCall>),
    /// Answer directly with this text.
    FinalAnswer(String),
}

impl StepOutcome {
    /// Classifies a model response.
    #[must_use]
    pub fn from_response(response: &ChatResponse) -> Self {
        if response.tool_calls.is_empty() {
            Self::FinalAnswer(response.content.clone())
        } else {
            Self::ContinueWithToolCall(response.tool_calls.clone())
        }
    }
}

/// One recorded step of an agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentStep {
    /// A model call that requested tools or answered.
    ModelTurn {
        /// Loop iteration, starting at 0.
        iteration: usize,
        /// Text returned by the model.
        content: String,
        /// Names of the tools requested.
        tool_calls: Vec<String>,
    },
    /// A completed tool call.
    ToolExecution {
        /// Tool name.
        name: String,
        /// Raw JSON arguments.
        arguments: String,
        /// Tool output or error description.
        output: String,
        /// Whether the tool reported an error to the model.
        is_error: bool,
    },
    /// The answer generation call.
    Generation {
        /// Generated answer text.
        content: String,
    },
}

/// The outcome of a successful agent run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentAnswer {
    /// Final answer text.
    pub answer: String,
    /// Steps taken, in order.
    pub steps: Vec<AgentStep>,
    /// Number of tool calls executed.
    pub tool_calls: usize,
    /// Token usage summed over all model calls.
    pub usage: TokenUsage,
}

/// Accumulates steps and usage during one attempt.
#[derive(Debug, Default)]
pub struct RunLog {
    steps: Vec<AgentStep>,
    tool_calls: usize,
    usage: TokenUsage,
}

impl RunLog {
    /// Records a model response.
    pub fn record_turn(&mut self, iteration: usize, response: &ChatResponse) {
        self.usage += response.usage;
        self.steps.push(AgentStep::ModelTurn {
            iteration,
            content: response.content.clone(),
            tool_calls: response.tool_calls.iter().map(|c| c.name.clone()).collect(),
        });
    }

    /// Records a tool execution.
    pub fn record_tool(&mut self, call: &ToolCall, result: &ToolResult) {
        self.tool_calls += 1;
        self.steps.push(AgentStep::ToolExecution {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            output: result.content.clone(),
            is_error: result.is_error,
        });
    }

    /// Records the answer generation call.
    pub fn record_generation(&mut self, response: &ChatResponse) {
        self.usage += response.usage;
        self.steps.push(AgentStep::Generation {
            content: response.content.clone(),
        });
    }

    /// Steps recorded so far.
    #[must_use]
    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    /// Finishes the run with `answer`.
    #[must_use]
    pub fn finish(self, answer: String) -> AgentAnswer {
        AgentAnswer {
            answer,
            steps: self.steps,
            tool_calls: self.tool_calls,
            usage: self.usage,
        }
    }
}

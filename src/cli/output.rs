//! Output formatting for CLI commands.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::AgentAnswer;
use crate::agent::state::AgentStep;
use crate::core::Chunk;

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, falling back to text for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as JSON followed by a newline.
    #[must_use]
    pub fn to_json<T: Serialize>(self, value: &T) -> String {
        let mut out = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("serialization failed: {e}") }).to_string()
        });
        out.push('\n');
        out
    }
}

/// Renders an agent answer, with the step trace when `verbose` is set.
#[must_use]
pub fn format_answer(answer: &AgentAnswer, verbose: bool, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(answer),
        OutputFormat::Text => {
            let mut out = format!("{}\n", answer.answer.trim_end());
            if verbose {
                out.push_str("\n---\n");
                for step in &answer.steps {
                    match step {
                        AgentStep::ModelTurn {
                            iteration,
                            tool_calls,
                            ..
                        } if !tool_calls.is_empty() => {
                            let _ = writeln!(out, "[turn {iteration}] calls {}", tool_calls.join(", "));
                        }
                        AgentStep::ModelTurn { iteration, .. } => {
                            let _ = writeln!(out, "[turn {iteration}] answered");
                        }
                        AgentStep::ToolExecution {
                            name,
                            output,
                            is_error,
                            ..
                        } => {
                            let status = if *is_error { "error" } else { "ok" };
                            let _ = writeln!(
                                out,
                                "[tool {name}] {status}, {} chars",
                                output.chars().count()
                            );
                        }
                        AgentStep::Generation { .. } => out.push_str("[generate] answer composed\n"),
                    }
                }
                let _ = writeln!(
                    out,
                    "tool calls: {}, tokens: {} (prompt {}, completion {})",
                    answer.tool_calls,
                    answer.usage.total_tokens,
                    answer.usage.prompt_tokens,
                    answer.usage.completion_tokens
                );
            }
            out
        }
    }
}

#[derive(Serialize)]
struct ChunkView {
    index: usize,
    page: usize,
    start: usize,
    end: usize,
    chars: usize,
    preview: String,
}

/// Renders the chunk listing of a document.
#[must_use]
pub fn format_chunks(
    source: &str,
    chunks: &[Chunk],
    preview_len: usize,
    format: OutputFormat,
) -> String {
    let views: Vec<ChunkView> = chunks
        .iter()
        .map(|c| ChunkView {
            index: c.index,
            page: c.page,
            start: c.char_range.start,
            end: c.char_range.end,
            chars: c.char_len(),
            preview: c.preview(preview_len),
        })
        .collect();

    match format {
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "source": source,
            "count": views.len(),
            "chunks": views,
        })),
        OutputFormat::Text => {
            let mut out = format!("{source}: {} chunk(s)\n", views.len());
            for v in &views {
                let _ = writeln!(
                    out,
                    "#{:<4} p{:<3} [{}..{}] {:>5} chars  {}",
                    v.index, v.page, v.start, v.end, v.chars, v.preview
                );
            }
            out
        }
    }
}

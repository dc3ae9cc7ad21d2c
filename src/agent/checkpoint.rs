//! In-memory conversation checkpoints keyed by thread id.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::message::{ChatMessage, Role};

/// Messages kept per thread unless configured otherwise.
pub const DEFAULT_MAX_MESSAGES: usize = 40;

/// Stores the recent message history of each thread for the process lifetime.
#[derive(Debug)]
pub struct MemoryCheckpointer {
    threads: Mutex<HashMap<String, Vec<ChatMessage>>>,
    max_messages: usize,
}

impl Default for MemoryCheckpointer {
    fn default() -> Self {
        Self::with_max_messages(DEFAULT_MAX_MESSAGES)
    }
}

impl MemoryCheckpointer {
    /// Creates an empty store keeping [`DEFAULT_MAX_MESSAGES`] per thread.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store keeping at most `max_messages` per thread.
    #[must_use]
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            threads: Mutex::default(),
            max_messages,
        }
    }

    /// Messages saved for `thread_id`, or none for an unknown thread.
    #[must_use]
    pub fn load(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces the saved history of `thread_id`, dropping the oldest
    /// turns beyond the configured maximum.
    pub fn save(&self, thread_id: &str, messages: Vec<ChatMessage>) {
        let messages = truncate_history(messages, self.max_messages);
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread_id.to_string(), messages);
    }

    /// Forgets `thread_id`.
    pub fn clear(&self, thread_id: &str) {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(thread_id);
    }
}

/// Keeps at most `max` trailing messages, starting on a user message so no
/// tool reply is separated from the request that produced it.
fn truncate_history(mut messages: Vec<ChatMessage>, max: usize) -> Vec<ChatMessage> {
    if messages.len() <= max {
        return messages;
    }
    let cut = messages.len() - max;
    let start = messages[cut..]
        .iter()
        .position(|m| m.role == Role::User)
        .map_or(messages.len(), |offset| cut + offset);
    messages.split_off(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{
        assistant_message, assistant_tool_calls_message, tool_message, user_message,
    };
    use crate::agent::tool::ToolCall;

    fn turn(question: &str) -> Vec<ChatMessage> {
        vec![
            user_message(question),
            assistant_tool_calls_message(
                "",
                vec![ToolCall {
                    id: format!("call_{question}"),
                    name: "retrieve".to_string(),
                    arguments: "{}".to_string(),
                }],
            ),
            tool_message(&format!("call_{question}"), "passages"),
            assistant_message("answer"),
        ]
    }

    #[test]
    fn test_threads_are_isolated() {
        let store = MemoryCheckpointer::new();
        assert!(store.load("a").is_empty());

        store.save("a", vec![user_message("first")]);
        store.save("b", vec![user_message("other"), user_message("more")]);
        assert_eq!(store.load("a").len(), 1);
        assert_eq!(store.load("b").len(), 2);

        store.clear("a");
        assert!(store.load("a").is_empty());
        assert_eq!(store.load("b").len(), 2);
    }

    #[test]
    fn test_history_is_capped_on_turn_boundary() {
        let store = MemoryCheckpointer::with_max_messages(6);
        let history: Vec<ChatMessage> = ["q1", "q2", "q3"].iter().flat_map(|q| turn(q)).collect();
        store.save("a", history);

        let kept = store.load("a");
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].role, Role::User);
        assert_eq!(kept[0].content, "q3");
    }

    #[test]
    fn test_short_history_is_kept_whole() {
        let store = MemoryCheckpointer::new();
        store.save("a", turn("q1"));
        assert_eq!(store.load("a"), turn("q1"));
    }
}

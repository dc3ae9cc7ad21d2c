//! Concrete [`LlmProvider`](super::provider::LlmProvider) backends.

pub(crate) mod http;
pub mod openai;

pub use openai::OpenAiProvider;

//! `OpenAI`-compatible chat provider.
//!
//! Requests and responses use the `async-openai` types; transport goes
//! through [`ApiClient`] so HTTP 429 is classified from the status line.
//! Mistral, `OpenAI` and local proxies are all reached through the base URL
//! in [`AgentConfig`].

use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionResponse,
    FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use tracing::debug;

use super::http::ApiClient;
use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::agent::tool::ToolCall;
use crate::error::AgentError;

/// `OpenAI`-compatible LLM provider.
#[derive(Debug)]
pub struct OpenAiProvider {
    api: ApiClient,
}

impl OpenAiProvider {
    /// Creates a new provider from agent configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] if the key cannot be sent as a
    /// header or the HTTP client cannot be built.
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        Ok(Self {
            api: ApiClient::new(config)?,
        })
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
                    msg.tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                });

                let content = (!msg.content.is_empty()).then(|| {
                    ChatCompletionRequestAssistantMessageContent::Text(msg.content.clone())
                });

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(msg.content.clone()),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    ///
    /// Uses `max_tokens` rather than `max_completion_tokens`; compatible
    /// servers such as Mistral only accept the former.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let tools = (!request.tools.is_empty()).then(|| {
            request
                .tools
                .iter()
                .map(|td| ChatCompletionTool {
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionObject {
                        name: td.name.clone(),
                        description: Some(td.description.clone()),
                        parameters: Some(td.parameters.clone()),
                        strict: None,
                    },
                })
                .collect()
        });

        #[allow(deprecated)]
        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools,
            ..Default::default()
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat completion"
        );

        let response: CreateChatCompletionResponse = self
            .api
            .post_json("chat/completions", &openai_request)
            .await?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let tool_calls = choice
            .and_then(|c| c.message.tool_calls.as_ref())
            .map(|tcs| {
                tcs.iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            tool_calls,
            finish_reason,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use crate::agent::message;
    use crate::agent::providers::http::tests::{MockServer, RATE_LIMIT_BODY};
    use crate::agent::tool::ToolSet;

    /// A minimal chat completion reply carrying `content`.
    pub(crate) fn completion_body(content: &str) -> String {
        serde_json::json!({
            "id": "cmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "mistral-large-latest",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        })
        .to_string()
    }

    fn request(tools: ToolSet, temperature: Option<f32>) -> ChatRequest {
        ChatRequest {
            model: "mistral-large-latest".to_string(),
            messages: vec![message::user_message("test")],
            temperature,
            max_tokens: Some(100),
            tools: tools.into_definitions(),
        }
    }

    #[test]
    fn test_convert_system_message() {
        let msg = message::system_message("test");
        let converted = OpenAiProvider::convert_message(&msg);
        assert!(matches!(converted, ChatCompletionRequestMessage::System(_)));
    }

    #[test]
    fn test_convert_user_message() {
        let msg = message::user_message("hello");
        let converted = OpenAiProvider::convert_message(&msg);
        assert!(matches!(converted, ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_convert_tool_message() {
        let msg = message::tool_message("call_123", "result data");
        let converted = OpenAiProvider::convert_message(&msg);
        if let ChatCompletionRequestMessage::Tool(t) = converted {
            assert_eq!(t.tool_call_id, "call_123");
        } else {
            panic!("Expected Tool message");
        }
    }

    #[test]
    fn test_convert_assistant_with_tool_calls() {
        let msg = message::assistant_tool_calls_message(
            "",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "retrieve".to_string(),
                arguments: r#"{"query":"bolsa familia"}"#.to_string(),
            }],
        );
        let converted = OpenAiProvider::convert_message(&msg);
        if let ChatCompletionRequestMessage::Assistant(a) = converted {
            assert_eq!(a.tool_calls.as_ref().map_or(0, Vec::len), 1);
            assert!(a.content.is_none());
        } else {
            panic!("Expected Assistant message");
        }
    }

    #[test]
    #[allow(deprecated)]
    fn test_build_request_keeps_zero_temperature() {
        let built = OpenAiProvider::build_request(&request(ToolSet::none(), Some(0.0)));
        assert_eq!(built.temperature, Some(0.0));
        assert_eq!(built.max_tokens, Some(100));
        assert!(built.tools.is_none());
    }

    #[test]
    fn test_build_request_with_tools() {
        let built = OpenAiProvider::build_request(&request(ToolSet::sql(), None));
        assert_eq!(built.tools.as_ref().map_or(0, Vec::len), 4);
    }

    fn http_config(url: &str) -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .base_url(url)
            .build()
            .unwrap_or_else(|e| panic!("config: {e}"))
    }

    #[tokio::test]
    async fn test_chat_429_is_rate_limited() {
        let server = MockServer::start(vec![(429, RATE_LIMIT_BODY.to_string())]).await;
        let provider =
            OpenAiProvider::new(&http_config(&server.url)).unwrap_or_else(|e| panic!("{e}"));

        let result = provider.chat(&request(ToolSet::retrieval(), None)).await;
        assert!(
            matches!(result, Err(AgentError::RateLimited { .. })),
            "{result:?}"
        );
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_chat_server_error_is_not_rate_limited() {
        let server = MockServer::start(vec![(500, r#"{"message":"boom"}"#.to_string())]).await;
        let provider =
            OpenAiProvider::new(&http_config(&server.url)).unwrap_or_else(|e| panic!("{e}"));

        let result = provider.chat(&request(ToolSet::none(), None)).await;
        assert!(
            matches!(result, Err(AgentError::ApiRequest { status: Some(500), .. })),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn test_chat_parses_completion() {
        let server = MockServer::start(vec![(200, completion_body("resposta"))]).await;
        let provider =
            OpenAiProvider::new(&http_config(&server.url)).unwrap_or_else(|e| panic!("{e}"));

        let response = provider
            .chat(&request(ToolSet::none(), Some(0.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(response.content, "resposta");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_chat_parses_tool_calls() {
        let body = r#"{"id":"c1","object":"chat.completion","created":1700000000,"model":"mistral-large-latest","choices":[{"index":0,"message":{"role":"assistant","content":"","tool_calls":[{"id":"call_1","type":"function","function":{"name":"retrieve","arguments":"{\"query\":\"bolsa\"}"}}]},"finish_reason":"tool_calls"}],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#;
        let server = MockServer::start(vec![(200, body.to_string())]).await;
        let provider =
            OpenAiProvider::new(&http_config(&server.url)).unwrap_or_else(|e| panic!("{e}"));

        let response = provider
            .chat(&request(ToolSet::retrieval(), None))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "retrieve");
        assert_eq!(response.tool_calls[0].arguments, r#"{"query":"bolsa"}"#);
    }
}

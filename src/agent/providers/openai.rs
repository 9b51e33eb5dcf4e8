//! Chat-completions backend built on `async-openai`.
//!
//! Works with any OpenAI-compatible server. The default configuration
//! points at a local Ollama host, which serves the same API under `/v1`.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionResponse,
};
use async_trait::async_trait;

use crate::agent::config::AgentConfig;
use crate::agent::provider::{Completion, CompletionRequest, LlmProvider};
use crate::error::AgentError;

/// OpenAI-compatible backend.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    api_base: String,
}

impl OpenAiProvider {
    /// Creates a backend for the host and key in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] if the HTTP client cannot be built.
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let api_base = config.api_base();
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(api_base.as_str());

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::ApiRequest {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
            })?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            api_base,
        })
    }

    fn build_request(request: &CompletionRequest) -> CreateChatCompletionRequest {
        let prompt = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(request.prompt.clone()),
            name: None,
        });

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![prompt],
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            ..Default::default()
        }
    }

    fn read_response(response: CreateChatCompletionResponse) -> Result<Completion, AgentError> {
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(AgentError::ResponseParse {
                message: "completion has no choices".to_string(),
                content: String::new(),
            });
        };

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            total_tokens: response.usage.map(|u| u.total_tokens),
            finish_reason: choice
                .finish_reason
                .map(|reason| format!("{reason:?}").to_lowercase()),
        })
    }

    fn status_of(error: &OpenAIError) -> Option<u16> {
        match error {
            OpenAIError::Reqwest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AgentError> {
        let response = self
            .client
            .chat()
            .create(Self::build_request(request))
            .await
            .map_err(|e| AgentError::ApiRequest {
                status: Self::status_of(&e),
                message: e.to_string(),
            })?;

        Self::read_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama3.2".to_string(),
            prompt: "rewrite this question".to_string(),
            temperature: Some(0.2),
            max_tokens: Some(100),
        }
    }

    #[test]
    fn test_prompt_becomes_single_user_turn() {
        let built = OpenAiProvider::build_request(&request());
        assert_eq!(built.model, "llama3.2");
        assert_eq!(built.messages.len(), 1);
        assert!(matches!(
            &built.messages[0],
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(text),
                ..
            }) if text == "rewrite this question"
        ));
        assert_eq!(built.max_completion_tokens, Some(100));
        assert_eq!(built.temperature, Some(0.2));
        assert!(built.stream.is_none());
    }

    #[test]
    fn test_reads_first_choice() {
        let response: CreateChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "llama3.2",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"query\": \"fog\"}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
        }))
        .unwrap_or_else(|_| unreachable!());

        let completion = OpenAiProvider::read_response(response).unwrap_or_default();
        assert_eq!(completion.text, "{\"query\": \"fog\"}");
        assert_eq!(completion.total_tokens, Some(25));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_no_choices_is_parse_error() {
        let response: CreateChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "llama3.2",
            "choices": []
        }))
        .unwrap_or_else(|_| unreachable!());

        assert!(matches!(
            OpenAiProvider::read_response(response),
            Err(AgentError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_provider_builds_from_config() {
        let config = AgentConfig::builder()
            .model("llama3.2")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let provider = OpenAiProvider::new(&config);
        assert!(provider.is_ok_and(|p| p.name() == "openai"));
    }
}

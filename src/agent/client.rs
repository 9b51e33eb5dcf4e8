//! Provider registry and the model client used by the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::provider::{CompletionRequest, LlmProvider};
use crate::agent::providers::OpenAiProvider;
use crate::agent::traits::LanguageModel;
use crate::error::AgentError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default): OpenAI-compatible APIs via `async-openai`,
///   including Ollama's `/v1` endpoint
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Box<dyn LlmProvider>, AgentError> {
    match config.provider.as_str() {
        "openai" | "ollama" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}

/// [`LanguageModel`] backed by an [`LlmProvider`] and a fixed model.
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl ModelClient {
    /// Creates a client that sends every prompt to `config.model`.
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Builds the provider named in `config` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the provider cannot be created.
    pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        let provider = create_provider(config)?;
        Ok(Self::new(Arc::from(provider), config))
    }
}

#[async_trait]
impl LanguageModel for ModelClient {
    async fn prompt(&self, prompt: &str) -> Result<String, AgentError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        };

        let completion = self.provider.complete(&request).await?;
        debug!(
            provider = self.provider.name(),
            model = %self.model,
            total_tokens = ?completion.total_tokens,
            finish_reason = ?completion.finish_reason,
            "language model responded"
        );
        Ok(completion.text)
    }
}

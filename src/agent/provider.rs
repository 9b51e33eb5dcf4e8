//! Model backends.
//!
//! The pipeline only ever sends one prompt and reads back one completion, so
//! the request and response types carry exactly that and nothing about
//! conversation history.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AgentError;

/// One prompt for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier, e.g. `llama3.2`.
    pub model: String,
    /// Full prompt text, sent as a single user turn.
    pub prompt: String,
    /// Sampling temperature; the backend default when `None`.
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
}

/// The model's reply to a [`CompletionRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Completion {
    /// Generated text. Empty when the model produced nothing.
    pub text: String,
    /// Tokens billed for prompt plus completion, when reported.
    pub total_tokens: Option<u32>,
    /// Why generation stopped (`stop`, `length`, ...), when reported.
    pub finish_reason: Option<String>,
}

/// A model backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one completion.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] on transport or API failures and
    /// [`AgentError::ResponseParse`] when the reply has no choices.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AgentError>;
}

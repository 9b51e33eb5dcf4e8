//! Capability traits for the query pipeline.
//!
//! The bridge depends on these rather than on concrete clients, so every
//! network-facing piece can be replaced by a test double.

use async_trait::async_trait;

use crate::error::{AgentError, BridgeError};

/// A single prompt-in, text-out language-model call.
///
/// Implementations keep no state between calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sends `prompt` as one user message and returns the response text.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures or timeouts.
    async fn prompt(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Produces a chat answer for a user question.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Answers `question`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] when any stage of answering fails.
    async fn answer(&self, question: &str) -> Result<String, BridgeError>;
}

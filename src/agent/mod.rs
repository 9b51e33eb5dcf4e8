//! Language-model query pipeline.
//!
//! Answers chat questions with a retrieval-augmented prompt. Uses a
//! pluggable provider abstraction backed by OpenAI-compatible APIs (a local
//! Ollama host by default).
//!
//! # Architecture
//!
//! ```text
//! Question → Orchestrator
//!   ├── validate (empty / oversize → InvalidQuery)
//!   ├── QueryOptimizer (one model call, JSON extraction, falls back to question)
//!   ├── KnowledgeAugmenter (retrieval service → "Document i of N" block)
//!   └── LanguageModel → final answer
//! ```

pub mod client;
pub mod config;
pub mod optimizer;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod traits;

// Re-export key types
pub use client::{ModelClient, create_provider};
pub use config::AgentConfig;
pub use optimizer::QueryOptimizer;
pub use orchestrator::{Orchestrator, PipelineAnswer};
pub use prompt::PromptSet;
pub use provider::{Completion, CompletionRequest, LlmProvider};
pub use traits::{LanguageModel, Responder};

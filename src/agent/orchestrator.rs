//! Orchestrator for the question-answering pipeline.
//!
//! Coordinates the full query pipeline: validate → optimize query →
//! retrieve knowledge → prompt the model for the final answer.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::optimizer::QueryOptimizer;
use super::prompt::PromptSet;
use super::traits::{LanguageModel, Responder};
use crate::error::{AgentError, BridgeError};
use crate::rag::{KnowledgeAugmenter, RetrievalService};

/// Longest question accepted, in bytes.
pub const MAX_QUERY_LEN: usize = 10_000;

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnswer {
    /// The question as asked.
    pub question: String,
    /// Query sent to the retrieval service.
    pub search_query: String,
    /// Whether any knowledge was appended to the prompt.
    pub used_knowledge: bool,
    /// Final model answer.
    pub answer: String,
    /// Wall-clock time for the whole run.
    pub elapsed_ms: u128,
}

/// Runs questions through optimizer, augmenter, and model.
pub struct Orchestrator {
    optimizer: QueryOptimizer,
    augmenter: KnowledgeAugmenter,
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptSet>,
}

impl Orchestrator {
    /// Creates an orchestrator. The same model serves the optimizer and the
    /// final answer.
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retrieval: Arc<dyn RetrievalService>,
        prompts: PromptSet,
    ) -> Self {
        let prompts = Arc::new(prompts);
        Self {
            optimizer: QueryOptimizer::new(Arc::clone(&llm), Arc::clone(&prompts)),
            augmenter: KnowledgeAugmenter::new(retrieval),
            llm,
            prompts,
        }
    }

    /// The optimizer stage on its own.
    pub const fn optimizer(&self) -> &QueryOptimizer {
        &self.optimizer
    }

    /// Executes the full pipeline for `question`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidQuery`] for an empty or oversize question,
    /// or the first retrieval or model failure. Optimization failures are not
    /// errors.
    pub async fn run(&self, question: &str) -> Result<PipelineAnswer, BridgeError> {
        validate_question(question)?;
        let start = Instant::now();

        let search_query = self.optimizer.optimize(question).await;
        let knowledge = self.augmenter.augment(&search_query).await?;

        let prompt = self.prompts.answer_prompt(question, &knowledge);
        let answer = self.llm.prompt(&prompt).await?;

        let elapsed_ms = start.elapsed().as_millis();
        info!(
            search_query = %search_query,
            used_knowledge = !knowledge.is_empty(),
            elapsed_ms,
            "question answered"
        );

        Ok(PipelineAnswer {
            question: question.to_string(),
            search_query,
            used_knowledge: !knowledge.is_empty(),
            answer,
            elapsed_ms,
        })
    }
}

#[async_trait]
impl Responder for Orchestrator {
    async fn answer(&self, question: &str) -> Result<String, BridgeError> {
        self.run(question).await.map(|result| result.answer)
    }
}

/// Rejects empty and oversize questions before any network call.
///
/// # Errors
///
/// Returns [`AgentError::InvalidQuery`] describing the problem.
pub fn validate_question(question: &str) -> Result<(), AgentError> {
    if question.trim().is_empty() {
        return Err(AgentError::InvalidQuery {
            message: "Query cannot be empty".to_string(),
        });
    }

    if question.len() > MAX_QUERY_LEN {
        return Err(AgentError::InvalidQuery {
            message: format!(
                "Query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                question.len()
            ),
        });
    }
    Ok(())
}

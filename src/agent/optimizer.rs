//! Query optimizer.
//!
//! Rewrites a free-form chat question into a search query by asking the
//! language model for a `{"query": "..."}` object. Any failure degrades to
//! the original question.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::prompt::PromptSet;
use super::traits::LanguageModel;
use crate::core::extract_object;

/// Number of extraction passes made over a single model response.
pub const MAX_EXTRACTION_ATTEMPTS: usize = 3;

/// Turns user questions into refined retrieval queries.
#[derive(Clone)]
pub struct QueryOptimizer {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptSet>,
}

impl QueryOptimizer {
    /// Creates an optimizer over `llm` using the optimizer template in `prompts`.
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<PromptSet>) -> Self {
        Self { llm, prompts }
    }

    /// Returns a refined query for `query`, or `query` itself when the model
    /// call fails or produces nothing usable.
    pub async fn optimize(&self, query: &str) -> String {
        let refined = self.try_optimize(query).await;
        if refined.is_empty() {
            debug!("query not optimized, using original");
            query.to_string()
        } else {
            debug!(original = query, refined = %refined, "query optimized");
            refined
        }
    }

    /// One model call; returns an empty string when no query was recovered.
    async fn try_optimize(&self, query: &str) -> String {
        let prompt = self.prompts.optimizer_prompt(query);
        let response = match self.llm.prompt(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "query optimization call failed");
                return String::new();
            }
        };

        // The response does not change between passes, so a pass can only
        // succeed where the first one did. Kept bounded at three.
        for attempt in 1..=MAX_EXTRACTION_ATTEMPTS {
            if let Some(refined) = extract_object(&response)
                .and_then(|object| object.get("query").and_then(query_text))
            {
                return refined;
            }
            debug!(attempt, "no query object in model response");
        }
        String::new()
    }
}

/// Reads the `query` field; non-string scalars are stringified.
fn query_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

//! Knowledge augmenter.
//!
//! Runs one retrieval call and renders the documents as a markdown block
//! that is appended to the answer prompt.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;

use super::client::RetrievalService;
use crate::error::RetrievalError;

/// Fetches knowledge for a query and renders it for the prompt.
#[derive(Clone)]
pub struct KnowledgeAugmenter {
    retrieval: Arc<dyn RetrievalService>,
}

impl KnowledgeAugmenter {
    /// Creates an augmenter over `retrieval`.
    pub fn new(retrieval: Arc<dyn RetrievalService>) -> Self {
        Self { retrieval }
    }

    /// Returns the rendered knowledge block for `query`, or an empty string
    /// when the service found nothing.
    ///
    /// # Errors
    ///
    /// Propagates [`RetrievalError`] from the service.
    pub async fn augment(&self, query: &str) -> Result<String, RetrievalError> {
        let documents = self.retrieval.query(query).await?;
        debug!(documents = documents.len(), "knowledge retrieved");
        Ok(render_knowledge(&documents))
    }
}

/// Renders `documents` under the knowledge-base header.
pub fn render_knowledge(documents: &[String]) -> String {
    if documents.is_empty() {
        return String::new();
    }

    let total = documents.len();
    let mut block = format!(
        "\n## Knowledge Base\n\
         {total} documents found in your RAG knowledge base. These may or may not\n\
         be relevant to understanding the user's query.\n\
         \n\
         In your response, do not reference the documents. The user can not see the documents,\n\
         so it sounds awkward when you reference them. Just use the information in formulating\n\
         your answer.\n"
    );

    for (i, document) in documents.iter().enumerate() {
        let _ = write!(block, "\n\n### Document {} of {total}\n{document}\n\n", i + 1);
    }
    block
}

//! Prompt templates for the query pipeline.
//!
//! Two prompts are used: one asking the model to rewrite the user's question
//! into a search query, and one asking it to answer the question with the
//! retrieved knowledge appended. Both can be overridden from files.

use std::path::Path;

/// Placeholder for the user's question in templates.
pub const QUERY_PLACEHOLDER: &str = "{query}";
/// Placeholder for the rendered knowledge block in the answer template.
pub const KNOWLEDGE_PLACEHOLDER: &str = "{knowledge}";

/// Template asking the model to produce `{"query": "..."}` for semantic search.
pub const OPTIMIZER_PROMPT: &str = r#"
You are a helpful assistant that re-formats user input into an optimized semantic query.
The query you produce will be used to search a RAG knowledge base for relevant information,
so it should be optimized for semantic search of the main topics in the users input

The user input is:

{query}

Response format should be formatted in a valid JSON block like this:
```json
{
  "query": "<string>"
}
```
Your response should include the valid JSON block and nothing else.
"#;

/// Template for the final answer.
pub const ANSWER_PROMPT: &str = r"
# Overview
You are a helpful tech-support agent. Your job is to answer technical questions.
You will be given a list of documents from your RAG knowledge database to help
answer the question, but those documents may not be relevant to the question.
Use your internal knowledge to answer the question, and only use the documents
when they seem relevant to the question being asked.

Question: {query}

## Writing Guidelines
- If the question is not related to technology, or if the input is not an explicit
or implied question, then you can ignore the prompt and not respond.

- If you do not know the answer, then respond that you do not know. Do not make up
an answer or hallucinate an answer.

{knowledge}
";

/// Filename for the optimizer template override.
pub const OPTIMIZER_FILENAME: &str = "optimizer.md";
/// Filename for the answer template override.
pub const ANSWER_FILENAME: &str = "answer.md";

/// The pair of templates used by the pipeline.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Query optimization template.
    pub optimizer: String,
    /// Final answer template.
    pub answer: String,
}

impl PromptSet {
    /// Loads templates from `prompt_dir`, falling back to compiled-in defaults.
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let load_file = |filename: &str, default: &str| -> String {
            prompt_dir
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            optimizer: load_file(OPTIMIZER_FILENAME, OPTIMIZER_PROMPT),
            answer: load_file(ANSWER_FILENAME, ANSWER_PROMPT),
        }
    }

    /// Writes the compiled-in default templates to `dir`.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for (filename, content) in [
            (OPTIMIZER_FILENAME, OPTIMIZER_PROMPT),
            (ANSWER_FILENAME, ANSWER_PROMPT),
        ] {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Renders the optimizer prompt for `query`.
    #[must_use]
    pub fn optimizer_prompt(&self, query: &str) -> String {
        render(&self.optimizer, &[(QUERY_PLACEHOLDER, query)])
    }

    /// Renders the answer prompt for `question` with `knowledge` appended.
    #[must_use]
    pub fn answer_prompt(&self, question: &str, knowledge: &str) -> String {
        render(
            &self.answer,
            &[(QUERY_PLACEHOLDER, question), (KNOWLEDGE_PLACEHOLDER, knowledge)],
        )
    }
}

/// Fills placeholders in one left-to-right pass over `template`.
///
/// Substituted values are never rescanned, so a question or document that
/// happens to contain `{query}` or `{knowledge}` is kept verbatim.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((at, placeholder, value)) = values
        .iter()
        .filter_map(|(placeholder, value)| {
            rest.find(placeholder).map(|at| (at, *placeholder, *value))
        })
        .min_by_key(|(at, _, _)| *at)
    {
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + placeholder.len()..];
    }
    out.push_str(rest);
    out
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::load(None)
    }
}

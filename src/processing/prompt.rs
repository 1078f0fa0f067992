//! Prompt templates with `{question}` and `{context}` placeholders.

use std::path::{Path, PathBuf};
use thiserror::Error;

const QUESTION_PLACEHOLDER: &str = "{question}";
const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Built-in template for the structured-answer flow.
pub const DEFAULT_ANSWER_TEMPLATE: &str = r#"You are a research assistant. Answer the question using only the context below.
If the context does not contain the answer, say that the answer is unknown.

Reply with a single JSON object and nothing else, in this shape:
{"answer": "<answer>", "relevant_context": "<passage you relied on>", "confidence": "low" | "medium" | "high"}

Context:
{context}

Question: {question}
"#;

/// Built-in template for the streamed research flow.
pub const DEFAULT_RESEARCH_TEMPLATE: &str = r#"You are a research assistant writing a short, well-sourced answer.
Use only the numbered chunks inside the context block. After every claim, cite the chunk it
came from as [CHUNK_n]. If the chunks do not answer the question, say so plainly.

{context}

Question: {question}
"#;

/// Errors raised while loading prompt templates.
#[derive(Debug, Error)]
pub enum PromptError {
    /// The template file could not be read.
    #[error("Failed to read prompt template {path}: {source}")]
    Unreadable {
        /// Template location.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// A required placeholder is absent from the template.
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Validate `text` as a template.
    pub fn new(text: impl Into<String>) -> Result<Self, PromptError> {
        let text = text.into();
        for placeholder in [QUESTION_PLACEHOLDER, CONTEXT_PLACEHOLDER] {
            if !text.contains(placeholder) {
                return Err(PromptError::MissingPlaceholder(placeholder));
            }
        }
        Ok(Self { text })
    }

    /// Built-in structured-answer template.
    pub fn answer() -> Self {
        Self {
            text: DEFAULT_ANSWER_TEMPLATE.to_string(),
        }
    }

    /// Built-in research template.
    pub fn research() -> Self {
        Self {
            text: DEFAULT_RESEARCH_TEMPLATE.to_string(),
        }
    }

    /// Load a template from `path`, or use `fallback` when no path is configured.
    pub fn load_or(path: Option<&Path>, fallback: Self) -> Result<Self, PromptError> {
        let Some(path) = path else {
            return Ok(fallback);
        };
        let text = std::fs::read_to_string(path).map_err(|source| PromptError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded prompt template");
        Self::new(text)
    }

    /// Substitute both placeholders in a single pass.
    ///
    /// Placeholder-like text inside `question` or `context` is copied verbatim.
    pub fn render(&self, question: &str, context: &str) -> String {
        let mut rendered = String::with_capacity(self.text.len() + question.len() + context.len());
        let mut rest = self.text.as_str();

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let tail = &rest[open..];
            if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                rendered.push_str(question);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
        rendered.push_str(rest);
        rendered
    }
}

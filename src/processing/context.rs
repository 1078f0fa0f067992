//! Turn retrieval results into prompt context.
//!
//! The plain form joins chunk texts for generic question answering. The scored form numbers
//! each chunk as `[CHUNK_n]` with its provenance and relevance score so a model can cite the
//! passage a claim came from.

use super::types::{ContextError, RetrievalResult};
use std::fmt;
use time::macros::format_description;

/// Line opening a scored context block.
pub const CONTEXT_OPEN: &str = "<<<CONTEXT>>>";
/// Line closing a scored context block.
pub const CONTEXT_CLOSE: &str = "<<<END CONTEXT>>>";

const NOT_AVAILABLE: &str = "N/A";
const ENTRY_SEPARATOR: &str = "\n\n";

/// Join chunk texts with a blank line between them, in retrieval order.
///
/// No results produce an empty string.
pub fn assemble_plain(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|result| result.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}

/// One numbered, provenance-annotated chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    /// 1-based citation number.
    pub ordinal: usize,
    /// Document title or `N/A`.
    pub title: String,
    /// Document URL or `N/A`.
    pub url: String,
    /// Publication date (`YYYY-MM-DD`) or `N/A`.
    pub published: String,
    /// Chunk text.
    pub content: String,
    /// Relevance score as reported by the index.
    pub score: f32,
}

impl fmt::Display for ContextEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[CHUNK_{}]\nTitle: {}\nURL: {}\nPublished: {}\nRelevance score: {:.4}\nContent: {}",
            self.ordinal,
            self.title,
            self.url,
            self.published,
            f64::from(self.score),
            self.content
        )
    }
}

/// Ranked context block rendered inside the [`CONTEXT_OPEN`]/[`CONTEXT_CLOSE`] envelope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoredContext {
    entries: Vec<ContextEntry>,
}

impl ScoredContext {
    /// Entries in citation order.
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Whether no chunk was retrieved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rendered entries without the envelope, separated by blank lines.
    pub fn body(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR)
    }
}

impl fmt::Display for ScoredContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{CONTEXT_OPEN}")?;
        if !self.entries.is_empty() {
            writeln!(f, "{}", self.body())?;
        }
        write!(f, "{CONTEXT_CLOSE}")
    }
}

/// Number every result from 1 and attach provenance and score.
///
/// Every result must carry a score; the first one without fails the whole block.
pub fn assemble_scored(results: &[RetrievalResult]) -> Result<ScoredContext, ContextError> {
    let date_format = format_description!("[year]-[month]-[day]");

    let entries = results
        .iter()
        .enumerate()
        .map(|(idx, result)| {
            let ordinal = idx + 1;
            let score = result
                .score
                .ok_or(ContextError::MissingScore { ordinal })?;
            let metadata = &result.chunk.metadata;
            Ok(ContextEntry {
                ordinal,
                title: or_placeholder(metadata.title.clone()),
                url: or_placeholder(metadata.url.clone()),
                published: or_placeholder(
                    metadata
                        .published_at
                        .and_then(|value| value.format(date_format).ok()),
                ),
                content: result.chunk.text.clone(),
                score,
            })
        })
        .collect::<Result<Vec<_>, ContextError>>()?;

    Ok(ScoredContext { entries })
}

fn or_placeholder(value: Option<String>) -> String {
    value
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

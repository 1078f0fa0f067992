//! Core data types and error definitions for the retrieval pipeline.

use crate::{
    embedding::EmbeddingClientError,
    index::IndexError,
    llm::LanguageModelError,
    processing::{loader::LoaderError, prompt::PromptError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Source identifier recorded when the caller supplies none.
pub const DEFAULT_SOURCE_ID: &str = "user_input";

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkingError {
    /// Chunk size and overlap cannot describe a valid sliding window.
    #[error("invalid chunking configuration: chunk_size={chunk_size}, overlap={overlap}")]
    InvalidConfiguration {
        /// Requested window size in characters.
        chunk_size: usize,
        /// Requested overlap in characters.
        overlap: usize,
    },
}

/// Errors produced while assembling retrieval results into prompt context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Scored formatting was requested for a result retrieved without a score.
    #[error("retrieval result #{ordinal} carries no score")]
    MissingScore {
        /// 1-based ordinal of the offending result.
        ordinal: usize,
    },
}

/// Errors produced while recovering a structured answer from a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    /// No parse strategy produced a valid answer object.
    #[error("language model reply is not a valid answer object: {reason}")]
    UnparsableAnswer {
        /// The model reply exactly as received.
        raw: String,
        /// Why the last attempted candidate was rejected.
        reason: String,
    },
}

impl AnswerError {
    /// The offending model reply, unmodified.
    pub fn raw(&self) -> &str {
        match self {
            Self::UnparsableAnswer { raw, .. } => raw,
        }
    }
}

/// Errors surfaced by [`crate::processing::RagService`].
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking parameters were rejected before any work was done.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Index connection, embedding, or query validation failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Retrieved context could not be formatted.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// The model reply did not contain a valid answer.
    #[error(transparent)]
    Answer(#[from] AnswerError),
    /// The language model failed to produce a reply.
    #[error("Language model request failed: {0}")]
    LanguageModel(#[from] LanguageModelError),
    /// A document could not be read.
    #[error("Failed to load document: {0}")]
    Loader(#[from] LoaderError),
    /// A prompt template could not be loaded.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The embedding provider could not be constructed.
    #[error("Embedding client setup failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
}

/// Provenance and position attached to a single chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetadata {
    /// 0-based position of the chunk within its source.
    pub position: usize,
    /// Identifier of the document the chunk was cut from.
    pub source_id: String,
    /// Character count of the chunk text.
    pub length: usize,
    /// Optional document title.
    pub title: Option<String>,
    /// Optional document URL.
    pub url: Option<String>,
    /// Optional publication timestamp.
    pub published_at: Option<OffsetDateTime>,
}

/// A bounded segment of source text plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Segment text.
    pub text: String,
    /// Position and provenance.
    pub metadata: ChunkMetadata,
}

/// Provenance supplied by the caller when ingesting a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSource {
    /// Identifier stored with every chunk (defaults to [`DEFAULT_SOURCE_ID`]).
    pub source_id: Option<String>,
    /// Document title.
    pub title: Option<String>,
    /// Document URL, e.g. a paper's PDF link.
    pub url: Option<String>,
    /// Publication timestamp.
    pub published_at: Option<OffsetDateTime>,
}

/// A chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// The matched chunk.
    pub chunk: Chunk,
    /// Backend score, present only for scored retrieval.
    pub score: Option<f32>,
}

/// Model-reported confidence in an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Weak support in the context.
    Low,
    /// Partial support in the context.
    Medium,
    /// Direct support in the context.
    High,
}

/// Structured answer recovered from a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    /// Answer text.
    pub answer: String,
    /// Passage the model relied on, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_context: Option<String>,
    /// Model-reported confidence, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

/// Outcome of answering a question through the plain-context flow.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Structured answer extracted from the model reply.
    pub answer: StructuredAnswer,
    /// Chunks that were supplied as context, in retrieval order.
    pub sources: Vec<RetrievalResult>,
}

/// Reachability snapshot for the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexHealthSnapshot {
    /// Whether the index answered its heartbeat and the collection is ready.
    pub reachable: bool,
    /// Collection the pipeline reads and writes.
    pub collection: String,
    /// Diagnostic captured when the index is unreachable.
    pub error: Option<String>,
}

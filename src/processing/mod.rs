//! Retrieval pipeline: chunking, context assembly, answer extraction, and the service that
//! ties them to the index and language model.

pub mod answer;
pub mod chunking;
pub mod context;
pub mod loader;
pub mod prompt;
pub mod sanitize;
mod service;
pub mod types;

pub use answer::{AnswerFormat, extract};
pub use chunking::{attach_metadata, chunk_document, split};
pub use context::{
    CONTEXT_CLOSE, CONTEXT_OPEN, ContextEntry, ScoredContext, assemble_plain, assemble_scored,
};
pub use loader::{LoadedDocument, LoaderError};
pub use prompt::{PromptError, PromptTemplate};
pub use service::{FileIngestReport, RagService, RagSettings};
pub use types::{
    AnswerError, AnswerOutcome, Chunk, ChunkMetadata, ChunkingError, Confidence, ContextError,
    DEFAULT_SOURCE_ID, DocumentSource, IndexHealthSnapshot, RagError, RetrievalResult,
    StructuredAnswer,
};

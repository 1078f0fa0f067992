#![deny(missing_docs)]

//! Core library for the Rusty RAG retrieval-augmented question answering pipeline.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Vector index gateway.
pub mod index;
/// Language model abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Chunking, context assembly, answer extraction, and the RAG service.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;

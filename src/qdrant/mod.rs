//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use payload::{build_payload, chunk_from_payload, point_identity};
pub use types::{Distance, PointInsert, QdrantError, ScoredPoint};

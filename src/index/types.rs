use crate::qdrant::{Distance, QdrantService};
use std::cmp::Ordering;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the index gateway.
///
/// Messages are captured as strings so a failed connection attempt can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The index could not be reached, timed out, or rejected a request.
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),
    /// The embedding provider failed for a chunk or question.
    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),
    /// The retrieval request was malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Connection and write settings for the vector index.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Index host, optionally carrying a scheme.
    pub host: String,
    /// Index HTTP port.
    pub port: u16,
    /// Collection that chunks are written to and read from.
    pub collection_name: String,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Metric the collection is created with.
    pub distance: Distance,
    /// Dimensionality of stored vectors.
    pub vector_size: usize,
    /// Deadline for each request, heartbeat attempts included.
    pub request_timeout: Duration,
    /// Points per upsert request.
    pub batch_size: usize,
}

/// Direction in which a backend score ranks results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOrder {
    /// Similarity metrics: larger is closer.
    HigherIsBetter,
    /// Distance metrics: smaller is closer.
    LowerIsBetter,
}

impl ScoreOrder {
    /// Score direction implied by a collection metric.
    pub fn for_distance(distance: Distance) -> Self {
        if distance.higher_is_better() {
            Self::HigherIsBetter
        } else {
            Self::LowerIsBetter
        }
    }

    /// Compare two scores so that the better one sorts first.
    pub fn compare(self, left: f32, right: f32) -> Ordering {
        match self {
            Self::HigherIsBetter => right.total_cmp(&left),
            Self::LowerIsBetter => left.total_cmp(&right),
        }
    }
}

/// Live, bootstrapped connection to the index collection.
pub struct IndexHandle {
    pub(crate) qdrant: QdrantService,
    pub(crate) collection: String,
    pub(crate) score_order: ScoreOrder,
}

impl IndexHandle {
    /// Collection bound to this handle.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ranking direction of scores returned through this handle.
    pub fn score_order(&self) -> ScoreOrder {
        self.score_order
    }

    /// Underlying Qdrant client.
    pub fn qdrant(&self) -> &QdrantService {
        &self.qdrant
    }
}

/// Outcome of an ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    /// Chunks handed to the gateway.
    pub requested: usize,
    /// Chunks durably written before the call finished or failed.
    pub ingested: usize,
}

impl IngestReport {
    /// Whether only part of the requested chunks were written.
    pub fn is_partial(&self) -> bool {
        self.ingested < self.requested
    }
}

//! Index gateway: connection lifecycle, ingestion, and similarity queries against the vector
//! index.

mod gateway;
mod retry;
mod types;

pub use gateway::IndexGateway;
pub use retry::RetryPolicy;
pub use types::{IndexError, IndexHandle, IndexSettings, IngestReport, ScoreOrder};

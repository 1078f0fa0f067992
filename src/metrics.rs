use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and answering activity.
#[derive(Default)]
pub struct RagMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    partial_ingestions: AtomicU64,
    questions_answered: AtomicU64,
    research_streams: AtomicU64,
    answer_parse_failures: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks actually written for it.
    pub fn record_document(&self, chunk_count: u64, partial: bool) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
        if partial {
            self.partial_ingestions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a question that produced a structured answer.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a research question whose token stream was opened.
    pub fn record_research_stream(&self) {
        self.research_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a model reply that could not be parsed into an answer.
    pub fn record_parse_failure(&self) {
        self.answer_parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            partial_ingestions: self.partial_ingestions.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            research_streams: self.research_streams.load(Ordering::Relaxed),
            answer_parse_failures: self.answer_parse_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents that have been indexed since startup.
    pub documents_indexed: u64,
    /// Total chunk count written across all indexed documents.
    pub chunks_indexed: u64,
    /// Ingestions that wrote only part of their chunks.
    pub partial_ingestions: u64,
    /// Questions answered with a structured answer.
    pub questions_answered: u64,
    /// Research answers streamed back to callers.
    pub research_streams: u64,
    /// Model replies rejected by the answer extractor.
    pub answer_parse_failures: u64,
}

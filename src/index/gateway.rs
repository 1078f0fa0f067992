use crate::embedding::EmbeddingClient;
use crate::index::retry::RetryPolicy;
use crate::index::types::{IndexError, IndexHandle, IndexSettings, IngestReport, ScoreOrder};
use crate::processing::{Chunk, IndexHealthSnapshot, RetrievalResult};
use crate::qdrant::payload::current_timestamp_rfc3339;
use crate::qdrant::{
    PointInsert, QdrantError, QdrantService, build_payload, chunk_from_payload, point_identity,
};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, PoisonError};

type PendingConnection = Shared<BoxFuture<'static, Result<Arc<IndexHandle>, IndexError>>>;

/// Owns the connection to the vector index and the embedding provider used to fill it.
///
/// The first [`IndexGateway::connect`] call bootstraps the connection; callers arriving while
/// that bootstrap is in flight await the same attempt. A failed bootstrap is handed to every
/// waiter and then forgotten so a later call can try again.
pub struct IndexGateway {
    settings: IndexSettings,
    embedder: Arc<dyn EmbeddingClient>,
    policy: RetryPolicy,
    connection: Mutex<Option<PendingConnection>>,
}

impl IndexGateway {
    /// Create a gateway; no network traffic happens until the first `connect`.
    pub fn new(
        settings: IndexSettings,
        embedder: Arc<dyn EmbeddingClient>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            settings,
            embedder,
            policy,
            connection: Mutex::new(None),
        }
    }

    /// Settings the gateway was created with.
    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Return the live index handle, bootstrapping it on first use.
    pub async fn connect(&self) -> Result<Arc<IndexHandle>, IndexError> {
        let pending = {
            let mut slot = self
                .connection
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = bootstrap(self.settings.clone(), self.policy)
                        .boxed()
                        .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;
        if result.is_err() {
            let mut slot = self
                .connection
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot
                .as_ref()
                .is_some_and(|current| Shared::ptr_eq(current, &pending))
            {
                *slot = None;
            }
        }
        result
    }

    /// Embed and upsert `chunks`, returning how many were written.
    ///
    /// Every chunk is embedded before anything is written, so an embedding failure leaves the
    /// index untouched. Writes are batched; once at least one batch has landed, a failing batch
    /// ends the call with a partial report instead of an error.
    pub async fn ingest(
        &self,
        handle: &IndexHandle,
        chunks: Vec<Chunk>,
    ) -> Result<IngestReport, IndexError> {
        let requested = chunks.len();
        if requested == 0 {
            return Ok(IngestReport {
                requested,
                ingested: 0,
            });
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embed(texts).await?;

        let ingested_at = current_timestamp_rfc3339();
        let points: Vec<PointInsert> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let (id, chunk_hash) = point_identity(chunk);
                PointInsert {
                    id,
                    vector,
                    payload: build_payload(chunk, &chunk_hash, &ingested_at),
                }
            })
            .collect();

        let batch_size = self.settings.batch_size.max(1);
        let mut ingested = 0;
        let mut points = points.into_iter().peekable();
        while points.peek().is_some() {
            let batch: Vec<PointInsert> = points.by_ref().take(batch_size).collect();
            match handle.qdrant.upsert_points(&handle.collection, batch).await {
                Ok(written) => ingested += written,
                Err(error) if ingested == 0 => return Err(unavailable("upsert", error)),
                Err(error) => {
                    tracing::warn!(
                        collection = %handle.collection,
                        requested,
                        ingested,
                        error = %error,
                        "Upsert batch failed; reporting partial ingestion"
                    );
                    break;
                }
            }
        }

        tracing::info!(
            collection = %handle.collection,
            requested,
            ingested,
            "Chunks ingested"
        );
        Ok(IngestReport {
            requested,
            ingested,
        })
    }

    /// Retrieve the `top_k` chunks closest to `question`, best first.
    ///
    /// Scores are dropped unless `scored` is set.
    pub async fn query(
        &self,
        handle: &IndexHandle,
        question: &str,
        top_k: usize,
        scored: bool,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        if question.trim().is_empty() {
            return Err(IndexError::InvalidQuery(
                "question must not be empty".into(),
            ));
        }
        if top_k == 0 {
            return Err(IndexError::InvalidQuery(
                "top_k must be greater than zero".into(),
            ));
        }

        let vector = self
            .embed(vec![question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::EmbeddingFailure("no vector for question".into()))?;

        let points = handle
            .qdrant
            .query_points(&handle.collection, vector, top_k)
            .await
            .map_err(|error| unavailable("query", error))?;

        let mut matches: Vec<(Chunk, f32)> = points
            .into_iter()
            .filter_map(|point| {
                let chunk = point.payload.and_then(chunk_from_payload);
                if chunk.is_none() {
                    tracing::warn!(point_id = %point.id, "Skipping point without chunk text");
                }
                chunk.map(|chunk| (chunk, point.score))
            })
            .collect();

        let order = handle.score_order;
        matches.sort_by(|left, right| order.compare(left.1, right.1));
        matches.truncate(top_k);

        tracing::debug!(
            collection = %handle.collection,
            top_k,
            scored,
            results = matches.len(),
            "Similarity query completed"
        );

        Ok(matches
            .into_iter()
            .map(|(chunk, score)| RetrievalResult {
                chunk,
                score: scored.then_some(score),
            })
            .collect())
    }

    /// Report whether the index answers and the collection is bootstrapped.
    pub async fn health(&self) -> IndexHealthSnapshot {
        let collection = self.settings.collection_name.clone();
        let outcome = match self.connect().await {
            Ok(handle) => handle
                .qdrant
                .heartbeat()
                .await
                .map_err(|error| unavailable("heartbeat", error)),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(()) => IndexHealthSnapshot {
                reachable: true,
                collection,
                error: None,
            },
            Err(error) => IndexHealthSnapshot {
                reachable: false,
                collection,
                error: Some(error.to_string()),
            },
        }
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, IndexError> {
        let expected = texts.len();
        let vectors = self
            .embedder
            .generate_embeddings(texts)
            .await
            .map_err(|error| IndexError::EmbeddingFailure(error.to_string()))?;

        if vectors.len() != expected {
            return Err(IndexError::EmbeddingFailure(format!(
                "expected {expected} vectors, received {}",
                vectors.len()
            )));
        }
        if let Some(vector) = vectors
            .iter()
            .find(|vector| vector.len() != self.settings.vector_size)
        {
            return Err(IndexError::EmbeddingFailure(format!(
                "expected dimension {}, received {}",
                self.settings.vector_size,
                vector.len()
            )));
        }
        Ok(vectors)
    }
}

async fn bootstrap(
    settings: IndexSettings,
    policy: RetryPolicy,
) -> Result<Arc<IndexHandle>, IndexError> {
    let qdrant = QdrantService::new(
        &settings.host,
        settings.port,
        settings.api_key.clone(),
        settings.request_timeout,
    )
    .map_err(|error| unavailable("client setup", error))?;

    let client = &qdrant;
    let timeout = settings.request_timeout;
    policy
        .run("index heartbeat", move |attempt| async move {
            match tokio::time::timeout(timeout, client.heartbeat()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) => Err(unavailable("heartbeat", error)),
                Err(_) => Err(IndexError::IndexUnavailable(format!(
                    "heartbeat attempt {attempt} timed out after {}ms",
                    timeout.as_millis()
                ))),
            }
        })
        .await?;

    qdrant
        .create_collection_if_not_exists(
            &settings.collection_name,
            settings.vector_size as u64,
            settings.distance,
        )
        .await
        .map_err(|error| unavailable("collection bootstrap", error))?;
    qdrant
        .ensure_payload_indexes(&settings.collection_name)
        .await
        .map_err(|error| unavailable("payload indexes", error))?;

    tracing::info!(
        url = %qdrant.base_url(),
        collection = %settings.collection_name,
        distance = settings.distance.as_qdrant(),
        "Index connection ready"
    );

    Ok(Arc::new(IndexHandle {
        qdrant,
        collection: settings.collection_name,
        score_order: ScoreOrder::for_distance(settings.distance),
    }))
}

fn unavailable(operation: &str, error: QdrantError) -> IndexError {
    IndexError::IndexUnavailable(format!("{operation} failed: {error}"))
}

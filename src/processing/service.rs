//! Retrieval-augmented service coordinating chunking, the index gateway, and the language model.

use crate::{
    config::Config,
    embedding::get_embedding_client,
    index::{IndexGateway, IngestReport},
    llm::{LanguageModel, TextStream, get_language_model},
    metrics::{MetricsSnapshot, RagMetrics},
    processing::{
        answer::extract,
        chunking::chunk_document,
        context::{assemble_plain, assemble_scored},
        loader::{LoaderError, discover, load_document},
        prompt::PromptTemplate,
        types::{AnswerOutcome, DocumentSource, IndexHealthSnapshot, RagError},
    },
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Chunking, retrieval, and prompt settings used by [`RagService`].
#[derive(Debug, Clone)]
pub struct RagSettings {
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Default number of chunks retrieved per question.
    pub top_k: usize,
    /// Template for the structured-answer flow.
    pub answer_template: PromptTemplate,
    /// Template for the streamed research flow.
    pub research_template: PromptTemplate,
}

impl RagSettings {
    /// Derive settings from configuration, loading template overrides from disk.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        Ok(Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            top_k: config.retrieval_top_k,
            answer_template: PromptTemplate::load_or(
                config.answer_prompt_path.as_deref().map(Path::new),
                PromptTemplate::answer(),
            )?,
            research_template: PromptTemplate::load_or(
                config.research_prompt_path.as_deref().map(Path::new),
                PromptTemplate::research(),
            )?,
        })
    }
}

/// Ingestion outcome for one file.
#[derive(Debug)]
pub struct FileIngestReport {
    /// File that was ingested.
    pub path: PathBuf,
    /// Chunk counts for the file, or why it could not be ingested.
    pub outcome: Result<IngestReport, RagError>,
}

impl FileIngestReport {
    /// Chunks written for this file.
    pub fn ingested(&self) -> usize {
        self.outcome.as_ref().map_or(0, |report| report.ingested)
    }

    /// Whether every chunk of the file was written.
    pub fn is_complete(&self) -> bool {
        self.outcome
            .as_ref()
            .is_ok_and(|report| !report.is_partial())
    }
}

/// Runs the ingest, answer, and research flows.
///
/// Construct once near process start; the index connection is bootstrapped lazily by the first
/// flow that needs it and shared afterwards.
pub struct RagService {
    gateway: IndexGateway,
    language_model: Arc<dyn LanguageModel>,
    settings: RagSettings,
    metrics: Arc<RagMetrics>,
}

impl RagService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        gateway: IndexGateway,
        language_model: Arc<dyn LanguageModel>,
        settings: RagSettings,
    ) -> Self {
        Self {
            gateway,
            language_model,
            settings,
            metrics: Arc::new(RagMetrics::new()),
        }
    }

    /// Build the service and its collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedder = get_embedding_client(config)?;
        let gateway = IndexGateway::new(config.index_settings(), embedder, config.retry_policy());
        let language_model = get_language_model(config)?;
        Ok(Self::new(
            gateway,
            language_model,
            RagSettings::from_config(config)?,
        ))
    }

    /// The index gateway used by every flow.
    pub fn gateway(&self) -> &IndexGateway {
        &self.gateway
    }

    /// Chunk, embed, and index a document's text.
    pub async fn ingest_text(
        &self,
        text: &str,
        source: DocumentSource,
    ) -> Result<IngestReport, RagError> {
        let chunks = chunk_document(
            text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
            &source,
        )?;
        if text.trim().is_empty() {
            tracing::debug!("Skipping blank document");
            return Ok(IngestReport {
                requested: 0,
                ingested: 0,
            });
        }

        tracing::info!(
            chunks = chunks.len(),
            chunk_size = self.settings.chunk_size,
            overlap = self.settings.chunk_overlap,
            "Processing document"
        );
        let handle = self.gateway.connect().await?;
        let report = self.gateway.ingest(&handle, chunks).await?;
        self.metrics
            .record_document(report.ingested as u64, report.is_partial());
        if report.is_partial() {
            tracing::warn!(
                requested = report.requested,
                ingested = report.ingested,
                "Document only partially ingested"
            );
        }
        Ok(report)
    }

    /// Ingest a document file, or every supported document under a directory.
    ///
    /// Fields set in `overrides` replace the provenance derived from each file path. A file that
    /// fails does not stop the others; its error is kept in its report. Blank files are skipped
    /// with an empty report.
    pub async fn ingest_file(
        &self,
        path: &Path,
        overrides: DocumentSource,
    ) -> Result<Vec<FileIngestReport>, RagError> {
        let mut reports = Vec::new();
        for file in discover(path)? {
            let outcome = self.ingest_one_file(&file, &overrides).await;
            match &outcome {
                Ok(report) => tracing::info!(
                    path = %file.display(),
                    requested = report.requested,
                    ingested = report.ingested,
                    "File ingested"
                ),
                Err(error) => tracing::warn!(
                    path = %file.display(),
                    error = %error,
                    "File not ingested"
                ),
            }
            reports.push(FileIngestReport {
                path: file,
                outcome,
            });
        }
        Ok(reports)
    }

    async fn ingest_one_file(
        &self,
        file: &Path,
        overrides: &DocumentSource,
    ) -> Result<IngestReport, RagError> {
        let document = match load_document(file).await {
            Ok(document) => document,
            Err(LoaderError::Empty(_)) => {
                tracing::debug!(path = %file.display(), "Skipping blank document");
                return Ok(IngestReport {
                    requested: 0,
                    ingested: 0,
                });
            }
            Err(error) => return Err(error.into()),
        };
        let source = DocumentSource {
            source_id: overrides.source_id.clone().or(document.source.source_id),
            title: overrides.title.clone().or(document.source.title),
            url: overrides.url.clone().or(document.source.url),
            published_at: overrides.published_at.or(document.source.published_at),
        };
        self.ingest_text(&document.text, source).await
    }

    /// Answer a question from plain retrieved context and parse the model's structured reply.
    pub async fn answer_question(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AnswerOutcome, RagError> {
        let top_k = top_k.unwrap_or(self.settings.top_k);
        let handle = self.gateway.connect().await?;
        let sources = self.gateway.query(&handle, question, top_k, false).await?;
        if sources.is_empty() {
            tracing::info!(top_k, "No stored context matched the question");
        }

        let context = assemble_plain(&sources);
        let prompt = self.settings.answer_template.render(question, &context);
        let reply = self.language_model.complete(&prompt).await?;

        match extract(&reply) {
            Ok(answer) => {
                self.metrics.record_answer();
                tracing::info!(
                    sources = sources.len(),
                    confidence = ?answer.confidence,
                    "Question answered"
                );
                Ok(AnswerOutcome { answer, sources })
            }
            Err(error) => {
                self.metrics.record_parse_failure();
                Err(error.into())
            }
        }
    }

    /// Answer a question from scored, citable context, streaming the model's reply verbatim.
    pub async fn research_question(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<TextStream, RagError> {
        let top_k = top_k.unwrap_or(self.settings.top_k);
        let handle = self.gateway.connect().await?;
        let results = self.gateway.query(&handle, question, top_k, true).await?;
        let context = assemble_scored(&results)?;

        let prompt = self
            .settings
            .research_template
            .render(question, &context.to_string());
        let stream = self.language_model.stream(&prompt).await?;
        self.metrics.record_research_stream();
        tracing::info!(chunks = context.entries().len(), "Research answer streaming");
        Ok(stream)
    }

    /// Reachability of the index.
    pub async fn health(&self) -> IndexHealthSnapshot {
        self.gateway.health().await
    }

    /// Current pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::index::{IndexError, IndexSettings, RetryPolicy};
    use crate::llm::LanguageModelError;
    use crate::processing::{AnswerError, Confidence};
    use crate::qdrant::Distance;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts
                .lock()
                .expect("prompts")
                .last()
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
            self.prompts.lock().expect("prompts").push(prompt.to_string());
            Ok(self.reply.clone())
        }

        async fn stream(&self, prompt: &str) -> Result<TextStream, LanguageModelError> {
            self.prompts.lock().expect("prompts").push(prompt.to_string());
            let fragments: Vec<Result<String, LanguageModelError>> = self
                .reply
                .split_inclusive(' ')
                .map(|fragment| Ok(fragment.to_string()))
                .collect();
            Ok(Box::pin(futures_util::stream::iter(fragments)))
        }
    }

    fn service(server: &MockServer, model: Arc<ScriptedModel>, chunk_size: usize, overlap: usize) -> RagService {
        let gateway = IndexGateway::new(
            IndexSettings {
                host: server.host(),
                port: server.port(),
                collection_name: "papers".into(),
                api_key: None,
                distance: Distance::Cosine,
                vector_size: 8,
                request_timeout: Duration::from_secs(5),
                batch_size: 16,
            },
            Arc::new(HashEmbeddingClient::new(8)),
            RetryPolicy::fixed(2, Duration::ZERO),
        );
        RagService::new(
            gateway,
            model,
            RagSettings {
                chunk_size,
                chunk_overlap: overlap,
                top_k: 3,
                answer_template: PromptTemplate::answer(),
                research_template: PromptTemplate::research(),
            },
        )
    }

    async fn mock_index(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(200).body("ok");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/papers");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/papers/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/papers/points/query");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [{
                            "id": "p1",
                            "score": 0.9,
                            "payload": {
                                "text": "Alpha methods are fast.",
                                "position": 0,
                                "source_id": "user_input",
                                "title": "Fast Alpha"
                            }
                        }]
                    }
                }));
            })
            .await;
    }

    #[tokio::test]
    async fn ingest_rejects_bad_chunking_before_connecting() {
        let server = MockServer::start_async().await;
        let heartbeat = server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(200);
            })
            .await;

        let service = service(&server, ScriptedModel::new(""), 10, 10);
        let error = service
            .ingest_text("Alpha methods are fast.", DocumentSource::default())
            .await
            .unwrap_err();

        assert!(matches!(error, RagError::Chunking(_)));
        assert_eq!(heartbeat.hits_async().await, 0);
    }

    #[tokio::test]
    async fn ingest_text_counts_written_chunks() {
        let server = MockServer::start_async().await;
        mock_index(&server).await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/papers/points")
                    .body_contains("\"source_id\":\"user_input\"");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let service = service(&server, ScriptedModel::new(""), 25, 5);
        let report = service
            .ingest_text(
                "Alpha methods are fast. Beta methods are slower.",
                DocumentSource::default(),
            )
            .await
            .expect("ingest");

        upsert.assert_async().await;
        assert!(report.ingested >= 2);
        assert!(!report.is_partial());
        let metrics = service.metrics_snapshot();
        assert_eq!(metrics.documents_indexed, 1);
        assert_eq!(metrics.chunks_indexed, report.ingested as u64);
    }

    #[tokio::test]
    async fn ingest_file_keeps_counts_past_failing_files() {
        let server = MockServer::start_async().await;
        mock_index(&server).await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/papers/points");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("a.txt"), "Alpha methods are fast.").expect("write");
        std::fs::write(dir.path().join("b.txt"), "   ").expect("write");
        std::fs::write(dir.path().join("c.txt"), [0xff_u8, 0xfe, 0x41]).expect("write");
        std::fs::write(dir.path().join("d.txt"), "Beta methods are slower.").expect("write");

        let service = service(&server, ScriptedModel::new(""), 100, 10);
        let reports = service
            .ingest_file(dir.path(), DocumentSource::default())
            .await
            .expect("directory ingest");

        let names: Vec<String> = reports
            .iter()
            .filter_map(|file| file.path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "d.txt"]);

        assert_eq!(reports[0].ingested(), 1);
        assert!(reports[0].is_complete());
        assert!(matches!(
            reports[1].outcome,
            Ok(IngestReport { requested: 0, ingested: 0 })
        ));
        assert!(matches!(
            reports[2].outcome,
            Err(RagError::Loader(LoaderError::InvalidUtf8 { .. }))
        ));
        assert!(!reports[2].is_complete());
        assert_eq!(reports[3].ingested(), 1);

        assert_eq!(upsert.hits_async().await, 2);
        assert_eq!(service.metrics_snapshot().documents_indexed, 2);
    }

    #[tokio::test]
    async fn answer_question_uses_plain_context() {
        let server = MockServer::start_async().await;
        mock_index(&server).await;
        let model = ScriptedModel::new(
            "```json\n{\"answer\": \"Alpha methods\", \"confidence\": \"high\"}\n```",
        );

        let service = service(&server, model.clone(), 100, 10);
        let outcome = service
            .answer_question("Which methods are fast?", None)
            .await
            .expect("answer");

        assert_eq!(outcome.answer.answer, "Alpha methods");
        assert_eq!(outcome.answer.confidence, Some(Confidence::High));
        assert_eq!(outcome.sources.len(), 1);
        assert!(outcome.sources[0].score.is_none());

        let prompt = model.last_prompt();
        assert!(prompt.contains("Alpha methods are fast."));
        assert!(prompt.contains("Question: Which methods are fast?"));
        assert!(!prompt.contains("[CHUNK_1]"));
        assert_eq!(service.metrics_snapshot().questions_answered, 1);
    }

    #[tokio::test]
    async fn answer_question_surfaces_unparsable_reply() {
        let server = MockServer::start_async().await;
        mock_index(&server).await;
        let raw = "Sorry, I cannot answer in JSON today.";

        let service = service(&server, ScriptedModel::new(raw), 100, 10);
        let error = service
            .answer_question("Which methods are fast?", Some(1))
            .await
            .unwrap_err();

        assert!(matches!(&error, RagError::Answer(answer) if answer.raw() == raw));
        assert!(matches!(error, RagError::Answer(AnswerError::UnparsableAnswer { .. })));
        assert_eq!(service.metrics_snapshot().answer_parse_failures, 1);
    }

    #[tokio::test]
    async fn research_question_streams_with_cited_context() {
        let server = MockServer::start_async().await;
        mock_index(&server).await;
        let model = ScriptedModel::new("Alpha is fast [CHUNK_1].");

        let service = service(&server, model.clone(), 100, 10);
        let stream = service
            .research_question("Which methods are fast?", Some(1))
            .await
            .expect("stream");
        let text: String = stream
            .map(|fragment| fragment.expect("fragment"))
            .collect::<Vec<_>>()
            .await
            .concat();

        assert_eq!(text, "Alpha is fast [CHUNK_1].");
        let prompt = model.last_prompt();
        assert!(prompt.contains("[CHUNK_1]\nTitle: Fast Alpha\nURL: N/A"));
        assert!(prompt.contains("Relevance score: 0.9000"));
        assert_eq!(service.metrics_snapshot().research_streams, 1);
    }

    #[tokio::test]
    async fn unreachable_index_is_not_an_empty_context() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(503);
            })
            .await;
        let model = ScriptedModel::new("{\"answer\": \"unknown\"}");

        let service = service(&server, model.clone(), 100, 10);
        let error = service
            .answer_question("Which methods are fast?", None)
            .await
            .unwrap_err();

        assert!(matches!(error, RagError::Index(IndexError::IndexUnavailable(_))));
        assert!(model.last_prompt().is_empty());
        assert!(!service.health().await.reachable);
    }
}

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use rustyrag::{
    config, logging,
    processing::{DocumentSource, RagError, RagService},
};
use serde_json::json;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

#[derive(Parser)]
#[command(
    name = "rustyrag",
    about = "Index documents into Qdrant and answer questions over them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk and index a document, or every .txt/.md/.pdf file under a directory.
    Ingest {
        path: PathBuf,
        /// Source identifier stored with every chunk (defaults to the file name).
        #[arg(long)]
        source_id: Option<String>,
        /// Document title (defaults to the file stem).
        #[arg(long)]
        title: Option<String>,
        /// Document URL.
        #[arg(long)]
        url: Option<String>,
        /// Publication date, RFC 3339 or YYYY-MM-DD.
        #[arg(long, value_parser = parse_published)]
        published: Option<OffsetDateTime>,
    },
    /// Answer a question and print the structured answer as JSON.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question with cited chunks, streaming the reply to stdout.
    Research {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Check that the vector index is reachable.
    Health,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();
    tracing::debug!(
        qdrant_host = %config.qdrant_host,
        qdrant_port = config.qdrant_port,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        llm_model = %config.llm_model,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        "Loaded configuration"
    );
    let service = RagService::from_config(config).context("failed to initialize pipeline")?;

    match cli.command {
        Command::Ingest {
            path,
            source_id,
            title,
            url,
            published,
        } => {
            let overrides = DocumentSource {
                source_id,
                title,
                url,
                published_at: published,
            };
            let reports = service
                .ingest_file(&path, overrides)
                .await
                .with_context(|| format!("failed to ingest {}", path.display()))?;
            let summary: Vec<_> = reports
                .iter()
                .map(|file| match &file.outcome {
                    Ok(report) => json!({
                        "path": file.path.display().to_string(),
                        "requested": report.requested,
                        "ingested": report.ingested,
                    }),
                    Err(error) => json!({
                        "path": file.path.display().to_string(),
                        "error": error.to_string(),
                    }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if reports.iter().any(|file| !file.is_complete()) {
                bail!("some documents were not fully ingested");
            }
        }
        Command::Ask { question, top_k } => match service.answer_question(&question, top_k).await {
            Ok(outcome) => {
                for source in &outcome.sources {
                    tracing::info!(
                        source_id = %source.chunk.metadata.source_id,
                        position = source.chunk.metadata.position,
                        "Context chunk"
                    );
                }
                println!("{}", serde_json::to_string_pretty(&outcome.answer)?);
            }
            Err(RagError::Answer(error)) => {
                eprintln!("raw model reply:\n{}", error.raw());
                return Err(error).context("model reply was not a structured answer");
            }
            Err(error) => return Err(error).context("failed to answer question"),
        },
        Command::Research { question, top_k } => {
            let mut stream = service
                .research_question(&question, top_k)
                .await
                .context("failed to start research answer")?;
            let mut stdout = tokio::io::stdout();
            while let Some(fragment) = stream.next().await {
                let fragment = fragment.context("research answer interrupted")?;
                stdout.write_all(fragment.as_bytes()).await?;
                stdout.flush().await?;
            }
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Command::Health => {
            let snapshot = service.health().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            if !snapshot.reachable {
                bail!("vector index is unreachable");
            }
        }
    }

    tracing::debug!(metrics = ?service.metrics_snapshot(), "Pipeline metrics");
    Ok(())
}

fn parse_published(value: &str) -> Result<OffsetDateTime, String> {
    if let Ok(timestamp) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(timestamp);
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|err| format!("expected RFC 3339 or YYYY-MM-DD: {err}"))
}

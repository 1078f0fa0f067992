//! Language model providers used to turn an assembled prompt into an answer.
//!
//! Two call shapes exist: a single completion (parsed afterwards by the answer extractor) and a
//! stream of incremental text fragments for research answers that are forwarded verbatim.

use crate::config::Config;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use ollama_rs::{Ollama, generation::completion::request::GenerationRequest, models::ModelOptions};
use reqwest::{Client, Url};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Incremental text fragments produced by a streaming generation.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LanguageModelError>> + Send>>;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// Provider could not be reached or the stream broke off.
    #[error("Language model unavailable: {0}")]
    Unavailable(String),
    /// Provider rejected or failed the generation request.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response was incomplete.
    #[error("Malformed language model response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by text generation backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a complete reply for a fully rendered prompt.
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError>;

    /// Generate a reply as a stream of text fragments.
    async fn stream(&self, prompt: &str) -> Result<TextStream, LanguageModelError>;
}

/// Build an Ollama client for `base_url` whose requests are bounded by `timeout`.
pub(crate) fn build_ollama(base_url: &str, timeout: Duration) -> Result<Ollama, String> {
    let url = Url::parse(base_url).map_err(|error| format!("invalid Ollama URL {base_url}: {error}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| format!("Ollama URL {base_url} has no host"))?;
    let port = url.port_or_known_default().unwrap_or(DEFAULT_OLLAMA_PORT);
    let http = Client::builder()
        .user_agent("rusty-rag/ollama")
        .timeout(timeout)
        .build()
        .map_err(|error| error.to_string())?;
    Ok(Ollama::new_with_client(
        format!("{}://{host}", url.scheme()),
        port,
        http,
    ))
}

/// Generation client backed by the Ollama `/api/generate` endpoint.
pub struct OllamaLanguageModel {
    client: Ollama,
    model: String,
    temperature: f32,
}

impl OllamaLanguageModel {
    /// Build a client for `model` served at `base_url`.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LanguageModelError> {
        let client = build_ollama(base_url, timeout).map_err(LanguageModelError::Unavailable)?;
        Ok(Self {
            client,
            model: model.into(),
            temperature,
        })
    }

    fn options(&self) -> ModelOptions {
        ModelOptions::default().temperature(self.temperature)
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.chars().count(), "Requesting completion");
        let response = self
            .client
            .generate(
                GenerationRequest::new(self.model.clone(), prompt.to_string())
                    .options(self.options()),
            )
            .await
            .map_err(|error| {
                LanguageModelError::GenerationFailed(format!("Ollama generation request failed: {error}"))
            })?;

        if !response.done {
            return Err(LanguageModelError::InvalidResponse(
                "Ollama response incomplete".into(),
            ));
        }

        Ok(response.response)
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream, LanguageModelError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.chars().count(), "Requesting streamed completion");
        let mut responses = self
            .client
            .generate_stream(
                GenerationRequest::new(self.model.clone(), prompt.to_string())
                    .options(self.options()),
            )
            .await
            .map_err(|error| {
                LanguageModelError::GenerationFailed(format!("Ollama streaming request failed: {error}"))
            })?;

        let stream = try_stream! {
            let mut finished = false;
            while let Some(batch) = responses.next().await {
                let batch = batch.map_err(|error| {
                    LanguageModelError::Unavailable(format!("stream interrupted: {error:?}"))
                })?;
                for frame in batch {
                    if !frame.response.is_empty() {
                        yield frame.response;
                    }
                    finished |= frame.done;
                }
                if finished {
                    break;
                }
            }

            if !finished {
                Err(LanguageModelError::InvalidResponse(
                    "stream ended before the final frame".into(),
                ))?;
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Build the language model client described by the configuration.
pub fn get_language_model(config: &Config) -> Result<Arc<dyn LanguageModel>, LanguageModelError> {
    Ok(Arc::new(OllamaLanguageModel::new(
        &config.ollama_url,
        config.llm_model.clone(),
        config.llm_temperature,
        config.request_timeout(),
    )?))
}

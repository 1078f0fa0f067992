use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::index::{IndexSettings, RetryPolicy};
use crate::qdrant::Distance;

const DEFAULT_QDRANT_PORT: u16 = 6333;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_CONNECT_DELAY_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INGEST_BATCH_SIZE: usize = 64;
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_LLM_TEMPERATURE: f32 = 0.5;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty RAG pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Hostname of the Qdrant instance that stores embeddings.
    pub qdrant_host: String,
    /// HTTP port of the Qdrant instance.
    pub qdrant_port: u16,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Distance metric the collection is created with.
    pub qdrant_distance: Distance,
    /// Upper bound on heartbeat attempts while connecting to the index.
    pub index_connect_attempts: u32,
    /// Fixed delay between heartbeat attempts, in milliseconds.
    pub index_connect_delay_ms: u64,
    /// Deadline applied to every outbound request, in seconds.
    pub request_timeout_secs: u64,
    /// Number of points sent per upsert request.
    pub ingest_batch_size: usize,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime serving embeddings and generation.
    pub ollama_url: String,
    /// Generation model used to answer questions.
    pub llm_model: String,
    /// Sampling temperature forwarded to the generation model.
    pub llm_temperature: f32,
    /// Chunk size in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Default number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Optional file overriding the built-in answer prompt.
    pub answer_prompt_path: Option<String>,
    /// Optional file overriding the built-in research prompt.
    pub research_prompt_path: Option<String>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process hashing encoder (offline runs and tests).
    Hash,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            qdrant_host: load_env("QDRANT_HOST")?,
            qdrant_port: parse_optional("QDRANT_PORT")?.unwrap_or(DEFAULT_QDRANT_PORT),
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_distance: parse_optional("QDRANT_DISTANCE")?.unwrap_or(Distance::Cosine),
            index_connect_attempts: parse_optional("INDEX_CONNECT_ATTEMPTS")?
                .unwrap_or(DEFAULT_CONNECT_ATTEMPTS),
            index_connect_delay_ms: parse_optional("INDEX_CONNECT_DELAY_MS")?
                .unwrap_or(DEFAULT_CONNECT_DELAY_MS),
            request_timeout_secs: parse_optional("REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ingest_batch_size: parse_optional("INGEST_BATCH_SIZE")?
                .unwrap_or(DEFAULT_INGEST_BATCH_SIZE),
            embedding_provider: load_env("EMBEDDING_PROVIDER")?.parse().map_err(|()| {
                ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
            })?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?.parse().map_err(|_| {
                ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string())
            })?,
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            llm_model: load_env("LLM_MODEL")?,
            llm_temperature: parse_optional("LLM_TEMPERATURE")?
                .unwrap_or(DEFAULT_LLM_TEMPERATURE),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            retrieval_top_k: parse_optional("RETRIEVAL_TOP_K")?.unwrap_or(DEFAULT_TOP_K),
            answer_prompt_path: load_env_optional("ANSWER_PROMPT_PATH"),
            research_prompt_path: load_env_optional("RESEARCH_PROMPT_PATH"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_OVERLAP".into()));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        if self.index_connect_attempts == 0 {
            return Err(ConfigError::InvalidValue("INDEX_CONNECT_ATTEMPTS".into()));
        }
        if self.ingest_batch_size == 0 {
            return Err(ConfigError::InvalidValue("INGEST_BATCH_SIZE".into()));
        }
        Ok(())
    }

    /// Deadline applied to outbound requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connection settings for the index gateway.
    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            host: self.qdrant_host.clone(),
            port: self.qdrant_port,
            collection_name: self.qdrant_collection_name.clone(),
            api_key: self.qdrant_api_key.clone(),
            distance: self.qdrant_distance,
            vector_size: self.embedding_dimension,
            request_timeout: self.request_timeout(),
            batch_size: self.ingest_batch_size,
        }
    }

    /// Heartbeat retry policy used while bootstrapping the index connection.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.index_connect_attempts,
            Duration::from_millis(self.index_connect_delay_ms),
        )
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

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

/// Runtime configuration for the docbrief service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Generative completion backend used for summaries and answers.
    pub llm_provider: CompletionProvider,
    /// Base URL of the completion provider.
    pub llm_base_url: String,
    /// Bearer token for OpenAI-compatible providers.
    pub llm_api_key: Option<String>,
    /// Model used for page, map, and combine calls.
    pub summary_model: String,
    /// Sampling temperature for summarization calls.
    pub summary_temperature: f32,
    /// Model used to answer questions against the corpus.
    pub answer_model: String,
    /// Token ceiling enforced per rate-limit window.
    pub rate_limit_tokens_per_window: usize,
    /// Length of the rate-limit window in seconds.
    pub rate_limit_window_secs: u64,
    /// Fixed token overhead added to every page estimate.
    pub page_token_overhead: usize,
    /// Pause after each successful page call, in milliseconds.
    pub page_cooldown_ms: u64,
    /// Minimum word count for a page to be summarized.
    pub min_page_words: usize,
    /// Number of page summaries folded into one map call.
    pub summary_batch_size: usize,
    /// Token estimator name (`chars` or a tiktoken model/encoding).
    pub token_estimator: String,
    /// Page extraction backend.
    pub extractor: ExtractorKind,
    /// Path or name of the `pdftotext` binary.
    pub pdftotext_bin: String,
    /// Optional directory receiving persisted summary records.
    pub summary_output_dir: Option<PathBuf>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime used for embeddings.
    pub ollama_url: String,
    /// Corpus file indexed at startup for question answering.
    pub corpus_path: Option<PathBuf>,
    /// Maximum words per corpus chunk.
    pub chunk_words: usize,
    /// Default number of chunks retrieved per question.
    pub search_top_k: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported generative completion backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Any OpenAI-compatible chat completions API (Groq, OpenAI, vLLM).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported embedding backends for the retrieval index.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic local hashing embedder.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported page extraction backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Poppler `pdftotext` command line tool.
    Pdftotext,
    /// Form-feed separated plain text files.
    PlainText,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_provider: CompletionProvider = parse_env_or("LLM_PROVIDER", CompletionProvider::OpenAI)?;
        let default_base_url = match llm_provider {
            CompletionProvider::OpenAI => DEFAULT_OPENAI_BASE_URL,
            CompletionProvider::Ollama => DEFAULT_OLLAMA_URL,
        };
        let llm_api_key = load_env_optional("LLM_API_KEY");
        if llm_provider == CompletionProvider::OpenAI && llm_api_key.is_none() {
            return Err(ConfigError::MissingVariable("LLM_API_KEY".into()));
        }

        let config = Self {
            llm_provider,
            llm_base_url: load_env_optional("LLM_BASE_URL")
                .unwrap_or_else(|| default_base_url.to_string()),
            llm_api_key,
            summary_model: load_env_optional("SUMMARY_MODEL")
                .unwrap_or_else(|| "gemma2-9b-it".into()),
            summary_temperature: parse_env_or("SUMMARY_TEMPERATURE", 0.2)?,
            answer_model: load_env_optional("ANSWER_MODEL")
                .unwrap_or_else(|| "llama-3.1-8b-instant".into()),
            rate_limit_tokens_per_window: parse_env_or("RATE_LIMIT_TOKENS_PER_WINDOW", 30_000)?,
            rate_limit_window_secs: parse_env_or("RATE_LIMIT_WINDOW_SECS", 60)?,
            page_token_overhead: parse_env_or("PAGE_TOKEN_OVERHEAD", 500)?,
            page_cooldown_ms: parse_env_or("PAGE_COOLDOWN_MS", 1500)?,
            min_page_words: parse_env_or("MIN_PAGE_WORDS", 30)?,
            summary_batch_size: parse_env_or("SUMMARY_BATCH_SIZE", 3)?,
            token_estimator: load_env_optional("TOKEN_ESTIMATOR").unwrap_or_else(|| "chars".into()),
            extractor: parse_env_or("EXTRACTOR", ExtractorKind::Pdftotext)?,
            pdftotext_bin: load_env_optional("PDFTOTEXT_BIN").unwrap_or_else(|| "pdftotext".into()),
            summary_output_dir: load_env_optional("SUMMARY_OUTPUT_DIR").map(PathBuf::from),
            embedding_provider: parse_env_or("EMBEDDING_PROVIDER", EmbeddingProvider::Hashing)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".into()),
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", 768)?,
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            corpus_path: load_env_optional("CORPUS_PATH").map(PathBuf::from),
            chunk_words: parse_env_or("CHUNK_WORDS", 300)?,
            search_top_k: parse_env_or("SEARCH_TOP_K", 5)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("RATE_LIMIT_TOKENS_PER_WINDOW", self.rate_limit_tokens_per_window),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window_secs as usize),
            ("SUMMARY_BATCH_SIZE", self.summary_batch_size),
            ("EMBEDDING_DIMENSION", self.embedding_dimension),
            ("CHUNK_WORDS", self.chunk_words),
            ("SEARCH_TOP_K", self.search_top_k),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "groq" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ExtractorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdftotext" | "pdf" => Ok(Self::Pdftotext),
            "plaintext" | "text" => Ok(Self::PlainText),
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
///
/// Returns the cached configuration when it was already installed.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        llm_provider = ?config.llm_provider,
        summary_model = %config.summary_model,
        answer_model = %config.answer_model,
        tokens_per_window = config.rate_limit_tokens_per_window,
        embedding_provider = ?config.embedding_provider,
        corpus = ?config.corpus_path,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

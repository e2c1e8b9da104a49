//! Configuration management for blogsearch.
//!
//! This module handles loading and merging configuration from multiple sources,
//! lowest precedence first:
//! - Built-in defaults
//! - Config file (`.blogsearch/config.yaml` or `BLOGSEARCH_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Environment variables used by the earlier Node/Python deployment
//! (`CHROMA_HOST`, `CHROMA_PORT`, `CHROMA_SSL`, `CHROMA_COLLECTION`,
//! `EMBED_MODEL`, `OPENROUTER_API_KEY`) are still honoured.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Known embedding providers.
pub const EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "trigram"];

/// Known vector index backends.
pub const INDEX_BACKENDS: [&str; 3] = ["memory", "sqlite", "chroma"];

/// Known generator providers.
pub const GENERATOR_PROVIDERS: [&str; 2] = ["ollama", "openai"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .blogsearch/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log line format ("pretty" or "json")
    pub log_format: String,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub server: ServerConfig,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub generator: GeneratorSettings,
    pub search: SearchSettings,
    pub ingest: IngestSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to (host:port)
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Provider name: "ollama" or "trigram"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Provider endpoint, when the provider is remote
    pub endpoint: Option<String>,

    /// Embedding vector dimensions
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "paraphrase-multilingual".to_string(),
            endpoint: None,
            dimensions: 768,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    /// Backend: "memory", "sqlite" or "chroma"
    pub backend: String,

    /// SQLite database path (defaults to `.blogsearch/index.sqlite`)
    pub path: Option<PathBuf>,

    /// Chroma server URL
    pub endpoint: Option<String>,

    /// Collection / table name
    pub collection: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: None,
            endpoint: None,
            collection: "blog_vi".to_string(),
        }
    }
}

/// Generator (LLM) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorSettings {
    /// Provider: "ollama" or "openai" (any OpenAI-compatible API)
    pub provider: String,

    /// Provider endpoint
    pub endpoint: Option<String>,

    /// Model identifier
    pub model: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: None,
            model: "llama3".to_string(),
            api_key_env: None,
            temperature: Some(0.3),
            max_tokens: Some(1000),
        }
    }
}

/// Search pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSettings {
    /// Number of chunks retrieved per query
    pub top_k: usize,

    /// Character budget for the assembled context block
    pub context_budget_chars: usize,

    /// Queries with more words than this are treated as questions
    pub question_word_threshold: usize,

    /// Optional relevance cutoff applied after retrieval
    pub min_score: Option<f32>,

    pub embed_timeout_secs: u64,
    pub retrieval_timeout_secs: u64,
    pub generation_timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            context_budget_chars: 6000,
            question_word_threshold: 5,
            min_score: None,
            embed_timeout_secs: 15,
            retrieval_timeout_secs: 10,
            generation_timeout_secs: 60,
        }
    }
}

/// Ingestion (post chunking) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestSettings {
    /// Maximum characters per chunk
    pub max_chunk_chars: usize,

    /// Characters of trailing sentences carried into the next chunk
    pub overlap_chars: usize,

    /// Texts per embedding batch
    pub batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: 1200,
            overlap_chars: 200,
            batch_size: 16,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    server: Option<ServerConfig>,
    embedding: Option<EmbeddingSettings>,
    index: Option<IndexSettings>,
    generator: Option<GeneratorSettings>,
    search: Option<SearchSettings>,
    ingest: Option<IngestSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    format: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            log_format: "pretty".to_string(),
            verbose: false,
            no_color: false,
            server: ServerConfig::default(),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            generator: GeneratorSettings::default(),
            search: SearchSettings::default(),
            ingest: IngestSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment, the config file and defaults.
    ///
    /// Environment variables:
    /// - `BLOGSEARCH_WORKSPACE`: Override workspace path
    /// - `BLOGSEARCH_CONFIG`: Path to config file
    /// - `BLOGSEARCH_BIND`: Server bind address
    /// - `BLOGSEARCH_EMBED_PROVIDER`, `BLOGSEARCH_EMBED_MODEL` (or `EMBED_MODEL`),
    ///   `BLOGSEARCH_EMBED_ENDPOINT`, `BLOGSEARCH_EMBED_DIMENSIONS`
    /// - `BLOGSEARCH_INDEX_BACKEND`, `BLOGSEARCH_INDEX_PATH`,
    ///   `BLOGSEARCH_INDEX_ENDPOINT` (or `CHROMA_HOST`/`CHROMA_PORT`/`CHROMA_SSL`),
    ///   `CHROMA_COLLECTION`
    /// - `BLOGSEARCH_GENERATOR_PROVIDER`, `BLOGSEARCH_GENERATOR_ENDPOINT`,
    ///   `BLOGSEARCH_GENERATOR_MODEL`
    /// - `BLOGSEARCH_TOP_K`
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use blogsearch_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Index backend: {}", config.index.backend);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using `env` to look up environment variables.
    pub fn load_with<F>(env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(workspace) = env("BLOGSEARCH_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Some(config_file) = env("BLOGSEARCH_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.workspace.join(".blogsearch/config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env(env)?;
        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(server) = file.server {
            result.server = server;
        }
        if let Some(embedding) = file.embedding {
            result.embedding = embedding;
        }
        if let Some(index) = file.index {
            result.index = index;
        }
        if let Some(generator) = file.generator {
            result.generator = generator;
        }
        if let Some(search) = file.search {
            result.search = search;
        }
        if let Some(ingest) = file.ingest {
            result.ingest = ingest;
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(format) = logging.format {
                result.log_format = format;
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Environment variables override the YAML config.
    fn apply_env<F>(&mut self, env: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = env("BLOGSEARCH_BIND") {
            self.server.bind = bind;
        }

        if let Some(provider) = env("BLOGSEARCH_EMBED_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Some(model) = env("BLOGSEARCH_EMBED_MODEL").or_else(|| env("EMBED_MODEL")) {
            self.embedding.model = model;
        }
        if let Some(endpoint) = env("BLOGSEARCH_EMBED_ENDPOINT") {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Some(dims) = env("BLOGSEARCH_EMBED_DIMENSIONS") {
            self.embedding.dimensions = parse_number("BLOGSEARCH_EMBED_DIMENSIONS", &dims)?;
        }

        if let Some(backend) = env("BLOGSEARCH_INDEX_BACKEND") {
            self.index.backend = backend;
        }
        if let Some(path) = env("BLOGSEARCH_INDEX_PATH") {
            self.index.path = Some(PathBuf::from(path));
        }
        if let Some(endpoint) = env("BLOGSEARCH_INDEX_ENDPOINT") {
            self.index.endpoint = Some(endpoint);
        } else if let Some(host) = env("CHROMA_HOST") {
            let port = match env("CHROMA_PORT") {
                Some(port) => parse_number::<u16>("CHROMA_PORT", &port)?,
                None => 8000,
            };
            let scheme = if env("CHROMA_SSL").as_deref() == Some("true") {
                "https"
            } else {
                "http"
            };
            self.index.endpoint = Some(format!("{}://{}:{}", scheme, host, port));
        }
        if let Some(collection) = env("CHROMA_COLLECTION") {
            self.index.collection = collection;
        }

        if let Some(provider) = env("BLOGSEARCH_GENERATOR_PROVIDER") {
            self.generator.provider = provider;
        }
        if let Some(endpoint) = env("BLOGSEARCH_GENERATOR_ENDPOINT") {
            self.generator.endpoint = Some(endpoint);
        }
        if let Some(model) = env("BLOGSEARCH_GENERATOR_MODEL") {
            self.generator.model = model;
        }

        if let Some(top_k) = env("BLOGSEARCH_TOP_K") {
            self.search.top_k = parse_number("BLOGSEARCH_TOP_K", &top_k)?;
        }

        if let Some(level) = env("RUST_LOG") {
            self.log_level = Some(level);
        }
        if env("NO_COLOR").is_some() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over everything else.
    pub fn with_overrides(mut self, overrides: CliOverrides) -> Self {
        if let Some(workspace) = overrides.workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = overrides.config_file {
            self.config_file = Some(config_file);
        }

        if let Some(bind) = overrides.bind {
            self.server.bind = bind;
        }

        if let Some(backend) = overrides.index_backend {
            self.index.backend = backend;
        }

        if let Some(provider) = overrides.generator_provider {
            self.generator.provider = provider;
        }

        if let Some(model) = overrides.generator_model {
            self.generator.model = model;
        }

        if let Some(top_k) = overrides.top_k {
            self.search.top_k = top_k;
        }

        if let Some(log_level) = overrides.log_level {
            self.log_level = Some(log_level);
        }

        if let Some(log_format) = overrides.log_format {
            self.log_format = log_format;
        }

        if overrides.verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .blogsearch directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(".blogsearch")
    }

    /// Ensure the .blogsearch directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .blogsearch directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved SQLite index path.
    pub fn index_path(&self) -> PathBuf {
        match self.index.path {
            Some(ref path) if path.is_absolute() => path.clone(),
            Some(ref path) => self.workspace.join(path),
            None => self.state_dir().join("index.sqlite"),
        }
    }

    /// Name of the environment variable carrying the generator API key.
    pub fn generator_api_key_env(&self) -> Option<String> {
        match self.generator.api_key_env {
            Some(ref name) => Some(name.clone()),
            None if self.generator.provider == "openai" => Some("OPENROUTER_API_KEY".to_string()),
            None => None,
        }
    }

    /// Resolve the generator API key from the process environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.generator_api_key_env()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        check_known("embedding provider", &self.embedding.provider, &EMBEDDING_PROVIDERS)?;
        check_known("index backend", &self.index.backend, &INDEX_BACKENDS)?;
        check_known("generator provider", &self.generator.provider, &GENERATOR_PROVIDERS)?;

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.search.top_k == 0 {
            return Err(AppError::Config("search.topK must be at least 1".to_string()));
        }

        if self.search.embed_timeout_secs == 0
            || self.search.retrieval_timeout_secs == 0
            || self.search.generation_timeout_secs == 0
        {
            return Err(AppError::Config(
                "search timeouts (embedTimeoutSecs, retrievalTimeoutSecs, generationTimeoutSecs) must be at least 1 second"
                    .to_string(),
            ));
        }

        if self.ingest.max_chunk_chars == 0 || self.ingest.batch_size == 0 {
            return Err(AppError::Config(
                "ingest.maxChunkChars and ingest.batchSize must be at least 1".to_string(),
            ));
        }

        if self.index.backend == "chroma" && self.index.endpoint.is_none() {
            return Err(AppError::Config(
                "Chroma backend requires index.endpoint (or CHROMA_HOST)".to_string(),
            ));
        }

        if self.generator.provider == "openai" && self.resolve_api_key().is_none() {
            let env_name = self.generator_api_key_env().unwrap_or_default();
            return Err(AppError::Config(format!(
                "API key not found in environment variable: {}",
                env_name
            )));
        }

        Ok(())
    }
}

/// Command-line overrides collected by the binary.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workspace: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub bind: Option<String>,
    pub index_backend: Option<String>,
    pub generator_provider: Option<String>,
    pub generator_model: Option<String>,
    pub top_k: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
}

fn check_known(what: &str, value: &str, known: &[&str]) -> AppResult<()> {
    if known.contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Unknown {}: {}. Supported: {}",
            what,
            value,
            known.join(", ")
        )))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", name, value)))
}

//! Service wiring from configuration.

use blogsearch_core::{AppConfig, AppResult};
use blogsearch_knowledge::embeddings::create_provider;
use blogsearch_knowledge::{create_index, EmbedderHandle, Ingestor, SearchPipeline, VectorIndex};
use blogsearch_llm::create_client;
use blogsearch_prompt::{resolve_prompt, PromptAssembler, DEFAULT_PROMPT_ID};
use std::sync::Arc;
use std::time::Duration;

/// Delay before the first embedder warm-up retry.
const WARM_UP_RETRY: Duration = Duration::from_secs(2);

/// Shared services behind every command and HTTP handler.
#[derive(Clone)]
pub struct App {
    pub pipeline: SearchPipeline,
    pub ingestor: Ingestor,
}

impl App {
    /// Build the services described by `config`.
    ///
    /// The embedder warms up in the background; must be called inside a
    /// tokio runtime.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let provider = create_provider(
            &config.embedding,
            Duration::from_secs(config.search.embed_timeout_secs),
        )?;
        tracing::info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            dimensions = provider.dimensions(),
            "Loading embedding model"
        );

        Self::with_embedder(config, EmbedderHandle::spawn(provider, WARM_UP_RETRY))
    }

    /// Build the services around an existing embedder.
    pub fn with_embedder(config: &AppConfig, embedder: EmbedderHandle) -> AppResult<Self> {
        let index = create_index(config)?;
        tracing::debug!(backend = index.backend_name(), "Opened vector index");

        let definition = resolve_prompt(&config.workspace, DEFAULT_PROMPT_ID)?;
        let assembler = PromptAssembler::new(definition, config.search.context_budget_chars)?;

        let api_key = config.resolve_api_key();
        let llm = create_client(
            &config.generator.provider,
            config.generator.endpoint.as_deref(),
            api_key.as_deref(),
            Duration::from_secs(config.search.generation_timeout_secs),
        )?;

        let pipeline = SearchPipeline::new(
            embedder.clone(),
            Arc::clone(&index),
            assembler,
            llm,
            &config.search,
            &config.generator,
        )?;
        let ingestor = Ingestor::new(embedder, index, config.ingest.clone())?;

        Ok(Self { pipeline, ingestor })
    }

    pub fn embedder(&self) -> &EmbedderHandle {
        self.pipeline.embedder()
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.pipeline.index()
    }
}

//! Ollama Embedding Provider
//!
//! Provides semantic embeddings via Ollama's local API using multilingual
//! models such as `paraphrase-multilingual`.
//!
//! # Features
//! - Local-first (no API costs, posts never leave the host)
//! - Multilingual support, including Vietnamese
//! - Automatic retry with exponential backoff
//! - Output re-normalized to unit length

use crate::embeddings::provider::{check_dimensions, normalize, EmbeddingProvider};
use async_trait::async_trait;
use blogsearch_core::AppError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Ollama API endpoint for embeddings
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Maximum retry attempts for failed requests
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Ollama embedding provider using local API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// HTTP client for API requests
    client: Client,
    /// Ollama API base URL
    base_url: String,
    /// Model name (e.g., "paraphrase-multilingual")
    model: String,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Request payload for Ollama embeddings API
#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response from Ollama embeddings API
#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Error response from Ollama API
#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create a provider for `model` at `base_url` (default `http://localhost:11434`).
    ///
    /// No request is made here; the model is checked by `warm_up`.
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::Embedding(format!("Failed to create HTTP client for Ollama: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_OLLAMA_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            dimensions,
        })
    }

    /// Embed single text with retry logic
    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed_with_retries(&self, text: &str, retries: u32) -> Result<Vec<f32>, AppError> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < retries {
            match self.embed_single(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    attempt += 1;
                    last_error = Some(e);

                    if attempt < retries {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        warn!(
                            "Embedding failed (attempt {}/{}), retrying in {}ms",
                            attempt, retries, backoff_ms
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Embedding("Unknown embedding error".to_string())))
    }

    /// Embed single text (no retries)
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::Embedding(format!("Failed to send request to Ollama: {}", e))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|body| body.error)
                .unwrap_or(error_text);

            return Err(AppError::Embedding(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let mut body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Embedding(format!("Failed to parse Ollama response: {}", e))
        })?;

        check_dimensions(&body.embedding, self.dimensions)?;
        normalize(&mut body.embedding);

        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    #[instrument(skip(self, text), fields(text_len = text.len(), provider = "ollama", model = %self.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::Embedding("Cannot embed empty text".to_string()));
        }

        self.embed_with_retries(text, MAX_RETRIES).await
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        debug!("Embedding batch of {} texts", texts.len());

        // The embeddings endpoint takes one prompt per request
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

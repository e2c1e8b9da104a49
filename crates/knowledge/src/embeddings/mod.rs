//! Embedding engine for the search index.
//!
//! Providers turn text into unit-length vectors. [`EmbedderHandle`] wraps a
//! provider with an explicit readiness state: the model is warmed up in the
//! background at startup, `embed` fails fast with [`EmbedError::NotReady`]
//! until that succeeds, and callers that can afford to wait use `ready()`.

pub mod provider;
pub mod providers;

pub use provider::{check_dimensions, create_provider, normalize, EmbeddingProvider};

use blogsearch_core::AppError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Longest pause between two warm-up attempts.
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Initialization state of an embedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum Readiness {
    Loading,
    Ready,
    /// Last warm-up failed; retries continue in the background.
    Failed(String),
}

/// Errors from [`EmbedderHandle::embed`].
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("Embedder is not ready: {0}")]
    NotReady(String),

    #[error(transparent)]
    Failed(#[from] AppError),
}

impl From<EmbedError> for AppError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::NotReady(reason) => {
                AppError::Embedding(format!("Embedder is not ready: {}", reason))
            }
            EmbedError::Failed(err) => err,
        }
    }
}

/// Shared, cloneable embedder service with explicit readiness.
#[derive(Debug, Clone)]
pub struct EmbedderHandle {
    provider: Arc<dyn EmbeddingProvider>,
    state: watch::Receiver<Readiness>,
}

impl EmbedderHandle {
    /// Warm the provider up in a background task.
    ///
    /// Failed warm-ups are retried with exponential backoff starting at
    /// `retry_interval`, so a model host that comes up late heals the
    /// handle without a restart. Must be called inside a tokio runtime.
    pub fn spawn(provider: Arc<dyn EmbeddingProvider>, retry_interval: Duration) -> Self {
        let (tx, rx) = watch::channel(Readiness::Loading);
        tokio::spawn(initialize(Arc::clone(&provider), tx, retry_interval));
        Self {
            provider,
            state: rx,
        }
    }

    /// Wrap a provider that needs no warm-up.
    pub fn ready_now(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let (_tx, rx) = watch::channel(Readiness::Ready);
        Self {
            provider,
            state: rx,
        }
    }

    /// Current readiness.
    pub fn readiness(&self) -> Readiness {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == Readiness::Ready
    }

    /// Wait until the embedder is ready.
    pub async fn ready(&self) -> Result<(), EmbedError> {
        let mut rx = self.state.clone();
        let outcome = rx
            .wait_for(|state| *state == Readiness::Ready)
            .await
            .map(|_| ());
        outcome.map_err(|_| EmbedError::NotReady(describe(&self.readiness())))
    }

    /// Embed `text`, failing immediately when the model is not loaded.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let readiness = self.readiness();
        if readiness != Readiness::Ready {
            return Err(EmbedError::NotReady(describe(&readiness)));
        }

        let vector = self.provider.embed(text).await?;
        check_dimensions(&vector, self.provider.dimensions())?;
        Ok(vector)
    }

    /// Embed a batch of texts, failing immediately when the model is not loaded.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let readiness = self.readiness();
        if readiness != Readiness::Ready {
            return Err(EmbedError::NotReady(describe(&readiness)));
        }

        let vectors = self.provider.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Failed(AppError::Embedding(format!(
                "Provider returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            ))));
        }
        for vector in &vectors {
            check_dimensions(vector, self.provider.dimensions())?;
        }
        Ok(vectors)
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }
}

fn describe(readiness: &Readiness) -> String {
    match readiness {
        Readiness::Loading => "model is still loading".to_string(),
        Readiness::Ready => "ready".to_string(),
        Readiness::Failed(reason) => format!("initialization failed: {}", reason),
    }
}

async fn initialize(
    provider: Arc<dyn EmbeddingProvider>,
    tx: watch::Sender<Readiness>,
    retry_interval: Duration,
) {
    let mut delay = retry_interval;
    loop {
        tracing::info!(
            "Warming up embedder '{}' (model: {}, dimensions: {})",
            provider.provider_name(),
            provider.model_name(),
            provider.dimensions()
        );

        match provider.warm_up().await {
            Ok(()) => {
                tracing::info!("Embedder '{}' ready", provider.model_name());
                let _ = tx.send(Readiness::Ready);
                return;
            }
            Err(e) => {
                tracing::warn!("Embedder warm-up failed, retrying in {:?}: {}", delay, e);
                if tx.send(Readiness::Failed(e.to_string())).is_err() {
                    // Every handle is gone
                    return;
                }
            }
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(MAX_RETRY_INTERVAL);
    }
}

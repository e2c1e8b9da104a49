//! Embedding provider trait and factory.

use blogsearch_core::config::EmbeddingSettings;
use blogsearch_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Probe text used to verify a provider at startup.
const WARM_UP_TEXT: &str = "kiểm tra kết nối";

/// Trait for embedding providers.
///
/// Every vector returned has exactly `dimensions()` components and unit
/// length, so cosine similarity reduces to a dot product.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }

    /// Load the model and check that it produces vectors of the right size.
    async fn warm_up(&self) -> AppResult<()> {
        let probe = self.embed(WARM_UP_TEXT).await?;
        check_dimensions(&probe, self.dimensions())
    }
}

/// Create an embedding provider from settings.
pub fn create_provider(
    settings: &EmbeddingSettings,
    timeout: Duration,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    if settings.dimensions == 0 {
        return Err(AppError::Config(
            "Embedding dimensions must be greater than zero".to_string(),
        ));
    }

    match settings.provider.as_str() {
        "trigram" => {
            let provider = super::providers::trigram::TrigramProvider::new(settings.dimensions);
            Ok(Arc::new(provider))
        }

        "ollama" => {
            let provider = super::providers::ollama::OllamaProvider::new(
                settings.endpoint.as_deref(),
                &settings.model,
                settings.dimensions,
                timeout,
            )?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, trigram",
            settings.provider
        ))),
    }
}

/// Fail unless `vector` has `expected` components.
pub fn check_dimensions(vector: &[f32], expected: usize) -> AppResult<()> {
    if vector.len() != expected {
        return Err(AppError::Embedding(format!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected,
            vector.len()
        )));
    }
    Ok(())
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str, dimensions: usize) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: provider.to_string(),
            model: "paraphrase-multilingual".to_string(),
            endpoint: None,
            dimensions,
        }
    }

    #[test]
    fn test_create_trigram_provider() {
        let provider = create_provider(&settings("trigram", 384), Duration::from_secs(1)).unwrap();
        assert_eq!(provider.provider_name(), "trigram");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn test_create_ollama_provider() {
        let provider = create_provider(&settings("ollama", 768), Duration::from_secs(1)).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "paraphrase-multilingual");
    }

    #[test]
    fn test_create_unknown_provider() {
        let result = create_provider(&settings("xenova", 384), Duration::from_secs(1));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(create_provider(&settings("trigram", 0), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 3];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }

    #[tokio::test]
    async fn test_warm_up_checks_dimensions() {
        let provider = create_provider(&settings("trigram", 64), Duration::from_secs(1)).unwrap();
        assert!(provider.warm_up().await.is_ok());
    }
}

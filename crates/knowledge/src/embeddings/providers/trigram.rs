//! Trigram embedding provider using character trigram-based content-aware embeddings.

use crate::embeddings::provider::{normalize, EmbeddingProvider};
use blogsearch_core::AppResult;
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

/// Trigram-based embedding provider for local, offline operation.
///
/// Generates deterministic embeddings based on text content using
/// character trigrams and word frequencies. Words are split on Unicode
/// word boundaries and lowercased, so Vietnamese diacritics survive and
/// short tokens such as "AI" still contribute. Not semantically accurate
/// like neural embedding models, but consistent and content-dependent.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

impl TrigramProvider {
    /// Create a new trigram provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Generate a trigram-based embedding for text.
    fn generate_trigram_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];

        let lower = text.to_lowercase();

        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower.unicode_words() {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in word_freq.iter() {
            // Pad so that one- and two-letter words still yield trigrams
            let chars: Vec<char> = format!(" {} ", word).chars().collect();
            for window in chars.windows(3) {
                let trigram_hash = window.iter().fold(0u64, |acc, c| {
                    acc.wrapping_mul(37).wrapping_add(*c as u64)
                });
                let dim_idx = (trigram_hash as usize) % self.dimensions;
                embedding[dim_idx] += (*freq as f32).sqrt();
            }

            // Also encode whole word
            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            let base_dim = (word_hash as usize) % self.dimensions;
            embedding[base_dim] += *freq as f32;
        }

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| self.generate_trigram_embedding(text))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_trigram_provider_embed_single() {
        let provider = TrigramProvider::new(384);
        let embedding = provider.embed("Công nghệ AI mới nhất").await.unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_trigram_provider_embed_batch() {
        let provider = TrigramProvider::new(384);
        let texts = vec![
            "Trí tuệ nhân tạo".to_string(),
            "Báo chí số".to_string(),
            "Du lịch Đà Nẵng".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), 384);
        }
    }

    #[tokio::test]
    async fn test_trigram_provider_deterministic() {
        let provider = TrigramProvider::new(384);
        let text = "AI sẽ thay đổi ngành báo chí như thế nào?";

        let embedding1 = provider.embed(text).await.unwrap();
        let embedding2 = provider.embed(text).await.unwrap();

        assert_eq!(embedding1, embedding2);
    }

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let provider = TrigramProvider::new(384);
        let query = provider.embed("công nghệ AI").await.unwrap();
        let related = provider
            .embed("Công nghệ AI đang thay đổi ngành báo chí.")
            .await
            .unwrap();
        let unrelated = provider
            .embed("Món phở bò Hà Nội nổi tiếng.")
            .await
            .unwrap();

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_trigram_provider_punctuation_only() {
        let provider = TrigramProvider::new(384);
        let embedding = provider.embed("?!").await.unwrap();

        assert_eq!(embedding.len(), 384);
        assert!(embedding.iter().all(|&x| x == 0.0));
    }
}

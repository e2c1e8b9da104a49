//! Vector index abstraction for post chunks.
//!
//! Defines a trait for backend-agnostic vector storage and retrieval, the
//! scoring helpers shared by the local backends, and the factory that picks
//! a backend from configuration.

use crate::types::{Chunk, IndexStats, ScoredChunk};
use blogsearch_core::{AppConfig, AppError, AppResult};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Trait for vector index backends.
///
/// Implementations must:
/// - return at most `k` hits ordered by non-increasing cosine similarity,
///   breaking ties by insertion order
/// - return an empty list (not an error) for an empty index or `k == 0`
/// - reject vectors whose length differs from `dimensions()`
/// - serve concurrent queries without serializing them
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name ("memory", "sqlite", "chroma").
    fn backend_name(&self) -> &str;

    /// Embedding dimension of this index generation.
    fn dimensions(&self) -> usize;

    /// Search for the top-k most similar chunks to `vector`.
    async fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<ScoredChunk>>;

    /// Insert or replace a chunk. A replaced chunk keeps its insertion rank.
    async fn upsert(&self, chunk: &Chunk) -> AppResult<()>;

    /// Insert or replace several chunks.
    async fn upsert_batch(&self, chunks: &[Chunk]) -> AppResult<()> {
        for chunk in chunks {
            self.upsert(chunk).await?;
        }
        Ok(())
    }

    /// Remove a chunk. Returns whether it existed.
    async fn delete(&self, chunk_id: &str) -> AppResult<bool>;

    /// Remove every chunk of a post. Returns the number removed.
    async fn delete_post(&self, post_id: &str) -> AppResult<usize>;

    /// Get statistics about the index.
    async fn stats(&self) -> AppResult<IndexStats>;

    /// Remove all chunks.
    async fn reset(&self) -> AppResult<()>;
}

/// Build the index selected by `config.index.backend`.
pub fn create_index(config: &AppConfig) -> AppResult<Arc<dyn VectorIndex>> {
    let dimensions = config.embedding.dimensions;

    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(crate::memory_index::MemoryIndex::new(dimensions))),

        "sqlite" => {
            let index = crate::sqlite_index::SqliteIndex::open(&config.index_path(), dimensions)?;
            Ok(Arc::new(index))
        }

        "chroma" => {
            let endpoint = config.index.endpoint.as_deref().ok_or_else(|| {
                AppError::Config("Chroma backend requires index.endpoint".to_string())
            })?;
            let index = crate::chroma_index::ChromaIndex::new(
                endpoint,
                &config.index.collection,
                dimensions,
                Duration::from_secs(config.search.retrieval_timeout_secs),
            )?;
            Ok(Arc::new(index))
        }

        other => Err(AppError::Config(format!(
            "Unknown index backend: '{}'. Supported backends: memory, sqlite, chroma",
            other
        ))),
    }
}

/// Fail unless `vector` matches the index dimension.
pub fn check_vector(vector: &[f32], dimensions: usize) -> AppResult<()> {
    if vector.len() != dimensions {
        return Err(AppError::Index(format!(
            "Embedding dimension mismatch: index has {}, got {}",
            dimensions,
            vector.len()
        )));
    }
    Ok(())
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Order hits by descending score and keep the first `k`.
///
/// `hits` must arrive in insertion order; the sort is stable, so equal
/// scores keep that order.
pub fn top_k(mut hits: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| descending(a.score, b.score));
    hits.truncate(k);
    hits
}

fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn hit(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            content: String::new(),
            metadata: ChunkMetadata::default(),
            score,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![1.0, 0.0, 0.0];
        let d = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&c, &d) - 0.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_top_k_stable_ties() {
        let hits = vec![hit("a", 0.5), hit("b", 0.9), hit("c", 0.5), hit("d", 0.5)];
        let ranked: Vec<String> = top_k(hits, 3).into_iter().map(|h| h.id).collect();
        assert_eq!(ranked, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_top_k_nan_sorts_last() {
        let hits = vec![hit("nan", f32::NAN), hit("low", 0.1)];
        let ranked = top_k(hits, 2);
        assert_eq!(ranked[0].id, "low");
    }

    #[test]
    fn test_top_k_zero() {
        assert!(top_k(vec![hit("a", 1.0)], 0).is_empty());
    }

    #[test]
    fn test_check_vector() {
        assert!(check_vector(&[0.0; 3], 3).is_ok());
        assert!(matches!(check_vector(&[0.0; 2], 3), Err(AppError::Index(_))));
    }
}

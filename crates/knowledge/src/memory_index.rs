//! In-process vector index.

use crate::types::{Chunk, IndexStats, ScoredChunk};
use crate::vector_index::{check_vector, cosine_similarity, top_k, VectorIndex};
use blogsearch_core::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Brute-force index kept in memory, in insertion order.
///
/// Queries take a shared read lock, so they run concurrently; writers hold
/// the exclusive lock only for the duration of one mutation.
#[derive(Debug)]
pub struct MemoryIndex {
    dimensions: usize,
    chunks: RwLock<Vec<Chunk>>,
}

impl MemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Vec<Chunk>>> {
        self.chunks
            .read()
            .map_err(|_| AppError::Index("Memory index lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Vec<Chunk>>> {
        self.chunks
            .write()
            .map_err(|_| AppError::Index("Memory index lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<ScoredChunk>> {
        check_vector(vector, self.dimensions)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits: Vec<ScoredChunk> = self
            .read()?
            .iter()
            .map(|chunk| ScoredChunk::from_chunk(chunk, cosine_similarity(vector, &chunk.embedding)))
            .collect();

        Ok(top_k(hits, k))
    }

    async fn upsert(&self, chunk: &Chunk) -> AppResult<()> {
        check_vector(&chunk.embedding, self.dimensions)?;

        let mut chunks = self.write()?;
        match chunks.iter_mut().find(|existing| existing.id == chunk.id) {
            Some(existing) => *existing = chunk.clone(),
            None => chunks.push(chunk.clone()),
        }
        Ok(())
    }

    async fn delete(&self, chunk_id: &str) -> AppResult<bool> {
        let mut chunks = self.write()?;
        let before = chunks.len();
        chunks.retain(|chunk| chunk.id != chunk_id);
        Ok(chunks.len() != before)
    }

    async fn delete_post(&self, post_id: &str) -> AppResult<usize> {
        let mut chunks = self.write()?;
        let before = chunks.len();
        chunks.retain(|chunk| chunk.metadata.post_id != post_id);
        Ok(before - chunks.len())
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        let chunks = self.read()?;
        let posts: HashSet<&str> = chunks
            .iter()
            .map(|chunk| chunk.metadata.post_id.as_str())
            .collect();

        Ok(IndexStats {
            backend: self.backend_name().to_string(),
            chunks: chunks.len(),
            posts: posts.len(),
            dimensions: self.dimensions,
            last_indexed_at: None,
        })
    }

    async fn reset(&self) -> AppResult<()> {
        self.write()?.clear();
        tracing::info!("Reset memory index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn chunk(id: &str, post_id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: format!("content of {}", id),
            embedding,
            metadata: ChunkMetadata {
                post_id: post_id.to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let index = MemoryIndex::new(2);
        assert!(index.query(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_orders_and_bounds() {
        let index = MemoryIndex::new(2);
        index.upsert(&chunk("a", "p1", vec![0.0, 1.0])).await.unwrap();
        index.upsert(&chunk("b", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(&chunk("c", "p2", vec![0.7, 0.7])).await.unwrap();

        let hits = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[1].id, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let index = MemoryIndex::new(2);
        index.upsert(&chunk("a", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(&chunk("b", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(&chunk("a", "p1", vec![1.0, 0.0])).await.unwrap();

        let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_and_delete_post() {
        let index = MemoryIndex::new(2);
        index.upsert(&chunk("a", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(&chunk("b", "p1", vec![0.0, 1.0])).await.unwrap();
        index.upsert(&chunk("c", "p2", vec![0.0, 1.0])).await.unwrap();

        assert!(index.delete("c").await.unwrap());
        assert!(!index.delete("c").await.unwrap());
        assert_eq!(index.delete_post("p1").await.unwrap(), 2);
        assert_eq!(index.stats().await.unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let index = MemoryIndex::new(3);
        assert!(index.upsert(&chunk("a", "p1", vec![1.0])).await.is_err());
        assert!(index.query(&[1.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn test_stats_counts_posts() {
        let index = MemoryIndex::new(2);
        index.upsert(&chunk("a", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(&chunk("b", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(&chunk("c", "p2", vec![1.0, 0.0])).await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.posts, 2);
        assert_eq!(stats.backend, "memory");
    }
}

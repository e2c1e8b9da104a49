//! Search index type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of indexed post text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier (`{postId}:{index}:{hash8}`)
    pub id: String,

    /// Plain-text content
    pub content: String,

    /// Embedding vector (L2-normalized)
    pub embedding: Vec<f32>,

    /// Post metadata carried with the chunk
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside each chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub post_id: String,
    pub title: String,
    pub url: String,

    #[serde(default)]
    pub chunk_index: usize,

    #[serde(default)]
    pub char_start: usize,

    #[serde(default)]
    pub char_end: usize,

    /// SHA-256 of the chunk text (hex)
    #[serde(default)]
    pub hash: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A retrieval hit: chunk fields plus cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

impl ScoredChunk {
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
            score,
        }
    }
}

/// A blog post as delivered by the content service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(alias = "_id", alias = "post_id")]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub slug: String,

    /// Post body (HTML)
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Publication status (`published`, `draft`, ...)
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, alias = "isDeleted")]
    pub deleted: bool,
}

impl Post {
    /// Whether the post should be searchable.
    pub fn is_live(&self) -> bool {
        !self.deleted
            && self
                .status
                .as_deref()
                .map_or(true, |status| status.eq_ignore_ascii_case("published"))
    }

    /// Public URL path of the post.
    pub fn url(&self) -> String {
        format!("/posts/{}", self.slug)
    }
}

/// Statistics for a vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub backend: String,
    pub chunks: usize,
    pub posts: usize,
    pub dimensions: usize,

    /// Time of the most recent chunk write, for backends that record it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<DateTime<Utc>>,
}

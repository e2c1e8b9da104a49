//! Post ingestion: HTML cleanup, sentence chunking, embedding and upsert.
//!
//! An [`Ingestor`] turns a [`Post`] into chunks with stable ids
//! (`{postId}:{index}:{hash8}`), embeds them in batches and replaces the
//! post's previous chunks in the index. [`EtlRequest`] is the
//! `{action, post}` envelope accepted by the HTTP endpoint and by files fed
//! to the `ingest` command.

pub mod chunker;
pub mod html;

pub use chunker::{chunk_by_sentences, TextChunk};
pub use html::html_to_text;

use crate::embeddings::EmbedderHandle;
use crate::types::{Chunk, ChunkMetadata, Post};
use crate::vector_index::VectorIndex;
use blogsearch_core::config::IngestSettings;
use blogsearch_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;
use walkdir::WalkDir;

/// Identifies a post by id only (delete requests).
#[derive(Debug, Clone, Deserialize)]
struct PostRef {
    #[serde(alias = "_id", alias = "post_id")]
    id: String,
}

/// One ingestion instruction.
#[derive(Debug, Clone)]
pub enum EtlRequest {
    Upsert(Post),
    Delete(String),
}

impl EtlRequest {
    /// Parse an `{action, post}` envelope.
    pub fn from_value(value: Value) -> AppResult<Self> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .filter(|action| !action.is_empty());
        let post = value.get("post").filter(|post| !post.is_null());

        let (Some(action), Some(post)) = (action, post) else {
            return Err(AppError::Ingest("Missing action or post data".to_string()));
        };

        match action {
            "upsert" => Ok(Self::Upsert(serde_json::from_value(post.clone())?)),
            "delete" => {
                let post: PostRef = serde_json::from_value(post.clone())?;
                Ok(Self::Delete(post.id))
            }
            other => Err(AppError::Ingest(format!("Invalid action: {}", other))),
        }
    }

    pub fn post_id(&self) -> &str {
        match self {
            Self::Upsert(post) => &post.id,
            Self::Delete(id) => id,
        }
    }
}

/// Result of processing one [`EtlRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EtlOutcome {
    pub status: String,
    pub message: String,
    pub chunks: usize,
}

impl EtlOutcome {
    fn success(message: String, chunks: usize) -> Self {
        Self {
            status: "success".to_string(),
            message,
            chunks,
        }
    }
}

/// Writes posts into a vector index.
#[derive(Clone)]
pub struct Ingestor {
    embedder: EmbedderHandle,
    index: Arc<dyn VectorIndex>,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        embedder: EmbedderHandle,
        index: Arc<dyn VectorIndex>,
        settings: IngestSettings,
    ) -> AppResult<Self> {
        if settings.max_chunk_chars == 0 {
            return Err(AppError::Config("ingest.maxChunkChars must be > 0".to_string()));
        }
        if settings.overlap_chars >= settings.max_chunk_chars {
            return Err(AppError::Config(
                "ingest.overlapChars must be smaller than ingest.maxChunkChars".to_string(),
            ));
        }
        if settings.batch_size == 0 {
            return Err(AppError::Config("ingest.batchSize must be > 0".to_string()));
        }
        if embedder.dimensions() != index.dimensions() {
            return Err(AppError::Config(format!(
                "Embedder produces {}-dimensional vectors but the index stores {}",
                embedder.dimensions(),
                index.dimensions()
            )));
        }

        Ok(Self {
            embedder,
            index,
            settings,
        })
    }

    /// Chunk a post without embedding it.
    pub fn prepare(&self, post: &Post) -> Vec<Chunk> {
        let text = html_to_text(&post.content);
        let url = post.url();

        chunk_by_sentences(&text, self.settings.max_chunk_chars, self.settings.overlap_chars)
            .into_iter()
            .enumerate()
            .map(|(idx, piece)| {
                let hash = format!("{:x}", Sha256::digest(piece.text.as_bytes()));
                Chunk {
                    id: format!("{}:{}:{}", post.id, idx, &hash[..8]),
                    content: piece.text,
                    embedding: Vec::new(),
                    metadata: ChunkMetadata {
                        post_id: post.id.clone(),
                        title: post.title.clone(),
                        url: url.clone(),
                        chunk_index: idx,
                        char_start: piece.char_start,
                        char_end: piece.char_end,
                        hash,
                        tags: post.tags.clone(),
                        category: post.category.clone(),
                    },
                }
            })
            .collect()
    }

    /// Replace the chunks of `post`. Returns the number of chunks written.
    ///
    /// Unpublished or deleted posts are removed from the index instead. New
    /// chunks are embedded before the old ones are removed, so an embedding
    /// failure leaves the previous version searchable.
    #[instrument(skip(self, post), fields(post_id = %post.id))]
    pub async fn upsert_post(&self, post: &Post) -> AppResult<usize> {
        if post.id.trim().is_empty() {
            return Err(AppError::Ingest("Post id is empty".to_string()));
        }

        if !post.is_live() {
            let removed = self.index.delete_post(&post.id).await?;
            tracing::info!(removed, "Post is not published, removed from index");
            return Ok(0);
        }

        let mut chunks = self.prepare(post);
        for batch in chunks.chunks_mut(self.settings.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = vector;
            }
        }

        let removed = self.index.delete_post(&post.id).await?;
        self.index.upsert_batch(&chunks).await?;

        tracing::info!(chunks = chunks.len(), removed, "Upserted post");
        Ok(chunks.len())
    }

    /// Remove every chunk of a post. Returns the number removed.
    #[instrument(skip(self))]
    pub async fn delete_post(&self, post_id: &str) -> AppResult<usize> {
        let removed = self.index.delete_post(post_id).await?;
        tracing::info!(removed, "Deleted post chunks");
        Ok(removed)
    }

    pub async fn process(&self, request: &EtlRequest) -> AppResult<EtlOutcome> {
        match request {
            EtlRequest::Upsert(post) => {
                let chunks = self.upsert_post(post).await?;
                Ok(EtlOutcome::success(
                    format!("Upserted {} chunks for post {}", chunks, post.id),
                    chunks,
                ))
            }
            EtlRequest::Delete(post_id) => {
                let removed = self.delete_post(post_id).await?;
                Ok(EtlOutcome::success(
                    format!("Deleted {} chunks for post {}", removed, post_id),
                    removed,
                ))
            }
        }
    }
}

/// Read ingestion requests from a JSON file or a directory of JSON files.
///
/// A file holds a post (treated as an upsert), an `{action, post}`
/// envelope, or an array of either. Directories are walked recursively in
/// file name order.
pub fn load_requests(path: &Path) -> AppResult<Vec<EtlRequest>> {
    if path.is_file() {
        return load_file(path);
    }
    if !path.is_dir() {
        return Err(AppError::Ingest(format!("Path not found: {}", path.display())));
    }

    let mut requests = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let entry_path = entry.path();
        if entry_path.is_file() && entry_path.extension().is_some_and(|ext| ext == "json") {
            requests.extend(load_file(entry_path)?);
        }
    }
    Ok(requests)
}

fn load_file(path: &Path) -> AppResult<Vec<EtlRequest>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| AppError::Ingest(format!("Invalid JSON in {}: {}", path.display(), e)))?;

    match value {
        Value::Array(items) => items.into_iter().map(request_from_value).collect(),
        other => Ok(vec![request_from_value(other)?]),
    }
}

fn request_from_value(value: Value) -> AppResult<EtlRequest> {
    if value.get("action").is_some() {
        EtlRequest::from_value(value)
    } else {
        Ok(EtlRequest::Upsert(serde_json::from_value(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::memory_index::MemoryIndex;
    use serde_json::json;
    use tempfile::TempDir;

    fn ingestor(index: Arc<MemoryIndex>) -> Ingestor {
        let embedder = EmbedderHandle::ready_now(Arc::new(TrigramProvider::new(64)));
        let settings = IngestSettings {
            max_chunk_chars: 60,
            overlap_chars: 0,
            batch_size: 2,
        };
        Ingestor::new(embedder, index, settings).unwrap()
    }

    fn post(id: &str, content: &str) -> Post {
        serde_json::from_value(json!({
            "post_id": id,
            "title": "Tin công nghệ",
            "slug": "tin-cong-nghe",
            "content": content,
            "tags": ["ai"],
            "category": "Công nghệ"
        }))
        .unwrap()
    }

    const BODY: &str = "<p>Trí tuệ nhân tạo đang thay đổi ngành báo chí.</p>\
        <p>Các tòa soạn dùng AI để tóm tắt tin tức.</p>\
        <p>Phóng viên vẫn kiểm chứng mọi thông tin.</p>";

    #[test]
    fn test_prepare_ids_and_metadata() {
        let index = Arc::new(MemoryIndex::new(64));
        let chunks = ingestor(index).prepare(&post("p1", BODY));

        assert_eq!(chunks.len(), 3);
        for (idx, chunk) in chunks.iter().enumerate() {
            let prefix = format!("p1:{}:", idx);
            assert!(chunk.id.starts_with(&prefix));
            assert_eq!(chunk.id.len(), prefix.len() + 8);
            assert!(chunk.metadata.hash.starts_with(&chunk.id[prefix.len()..]));
            assert_eq!(chunk.metadata.chunk_index, idx);
            assert_eq!(chunk.metadata.url, "/posts/tin-cong-nghe");
            assert_eq!(chunk.metadata.tags, vec!["ai".to_string()]);
            assert_eq!(chunk.metadata.category.as_deref(), Some("Công nghệ"));
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = Arc::new(MemoryIndex::new(64));
        let ingestor = ingestor(Arc::clone(&index));

        assert_eq!(ingestor.upsert_post(&post("p1", BODY)).await.unwrap(), 3);
        assert_eq!(ingestor.upsert_post(&post("p1", BODY)).await.unwrap(), 3);

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.posts, 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_version() {
        let index = Arc::new(MemoryIndex::new(64));
        let ingestor = ingestor(Arc::clone(&index));

        ingestor.upsert_post(&post("p1", BODY)).await.unwrap();
        let written = ingestor
            .upsert_post(&post("p1", "<p>Bài viết đã được rút gọn.</p>"))
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(index.stats().await.unwrap().chunks, 1);
    }

    #[tokio::test]
    async fn test_unpublished_post_is_removed() {
        let index = Arc::new(MemoryIndex::new(64));
        let ingestor = ingestor(Arc::clone(&index));
        ingestor.upsert_post(&post("p1", BODY)).await.unwrap();

        let mut draft = post("p1", BODY);
        draft.status = Some("draft".to_string());
        assert_eq!(ingestor.upsert_post(&draft).await.unwrap(), 0);
        assert_eq!(index.stats().await.unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn test_process_delete() {
        let index = Arc::new(MemoryIndex::new(64));
        let ingestor = ingestor(Arc::clone(&index));
        ingestor.upsert_post(&post("p1", BODY)).await.unwrap();

        let request =
            EtlRequest::from_value(json!({"action": "delete", "post": {"post_id": "p1"}})).unwrap();
        let outcome = ingestor.process(&request).await.unwrap();

        assert_eq!(outcome.status, "success");
        assert_eq!(outcome.chunks, 3);
        assert_eq!(index.stats().await.unwrap().chunks, 0);
    }

    #[test]
    fn test_envelope_validation() {
        let missing = EtlRequest::from_value(json!({"action": "upsert"})).unwrap_err();
        assert!(missing.to_string().contains("Missing action or post data"));

        let invalid =
            EtlRequest::from_value(json!({"action": "publish", "post": {"post_id": "p1"}}))
                .unwrap_err();
        assert!(invalid.to_string().contains("Invalid action"));
    }

    #[test]
    fn test_new_rejects_bad_settings() {
        let embedder = EmbedderHandle::ready_now(Arc::new(TrigramProvider::new(64)));
        let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(64));
        let settings = IngestSettings {
            max_chunk_chars: 100,
            overlap_chars: 100,
            batch_size: 4,
        };
        assert!(Ingestor::new(embedder.clone(), Arc::clone(&index), settings).is_err());

        let other_dims: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(32));
        assert!(Ingestor::new(embedder, other_dims, IngestSettings::default()).is_err());
    }

    #[test]
    fn test_load_requests_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            json!({"post_id": "p1", "title": "A", "slug": "a", "content": "x"}).to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            json!([
                {"action": "upsert", "post": {"post_id": "p2", "title": "B", "slug": "b"}},
                {"action": "delete", "post": {"_id": "p3"}}
            ])
            .to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let requests = load_requests(dir.path()).unwrap();
        let ids: Vec<&str> = requests.iter().map(EtlRequest::post_id).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        assert!(matches!(requests[2], EtlRequest::Delete(_)));
    }
}

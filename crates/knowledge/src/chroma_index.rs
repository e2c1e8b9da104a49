//! Chroma-backed vector index.
//!
//! Talks to a Chroma server over its `/api/v1` REST API. The collection is
//! created on first use with cosine distance; similarity is reported as
//! `1 - distance`. Metadata keys are snake_case so collections written by
//! other Chroma clients stay readable.

use crate::types::{Chunk, ChunkMetadata, IndexStats, ScoredChunk};
use crate::vector_index::{check_vector, top_k, VectorIndex};
use blogsearch_core::{AppError, AppResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::OnceCell;

const API_PREFIX: &str = "/api/v1";

/// Vector index stored in a remote Chroma collection.
#[derive(Debug)]
pub struct ChromaIndex {
    client: Client,
    base_url: String,
    collection: String,
    dimensions: usize,
    collection_id: OnceCell<String>,
}

#[derive(Debug, Serialize)]
struct CreateCollection<'a> {
    name: &'a str,
    metadata: Value,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: [&'static str; 3],
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Value>>>,
}

impl ChromaIndex {
    /// Create a client for `collection` on the server at `base_url`.
    pub fn new(
        base_url: &str,
        collection: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> AppResult<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "Chroma endpoint must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Index(format!("Failed to build Chroma HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            dimensions,
            collection_id: OnceCell::new(),
        })
    }

    async fn collection_id(&self) -> AppResult<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let body = CreateCollection {
                    name: &self.collection,
                    metadata: json!({ "hnsw:space": "cosine" }),
                    get_or_create: true,
                };
                let info: CollectionInfo = self.post("/collections", &body).await?;
                tracing::debug!("Using Chroma collection '{}' ({})", self.collection, info.id);
                Ok::<_, AppError>(info.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn collection_path(&self, action: &str) -> AppResult<String> {
        Ok(format!("/collections/{}/{}", self.collection_id().await?, action))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AppResult<T> {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Chroma request to {} failed: {}", path, e)))?;
        Self::decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Chroma request to {} failed: {}", path, e)))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(AppError::Index(format!(
                "Chroma API error on {} ({}): {}",
                path, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Index(format!("Failed to parse Chroma response from {}: {}", path, e)))
    }

    async fn count(&self) -> AppResult<usize> {
        let path = self.collection_path("count").await?;
        self.get(&path).await
    }

    async fn ids_where(&self, filter: Option<Value>) -> AppResult<GetResponse> {
        let path = self.collection_path("get").await?;
        let mut body = json!({ "include": ["metadatas"] });
        if let Some(filter) = filter {
            body["where"] = filter;
        }
        self.post(&path, &body).await
    }

    async fn delete_ids(&self, ids: &[String]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let path = self.collection_path("delete").await?;
        let _: Value = self.post(&path, &json!({ "ids": ids })).await?;
        Ok(())
    }
}

fn to_chroma_metadata(meta: &ChunkMetadata) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("post_id".to_string(), json!(meta.post_id));
    map.insert("title".to_string(), json!(meta.title));
    map.insert("url".to_string(), json!(meta.url));
    map.insert("chunk_index".to_string(), json!(meta.chunk_index));
    map.insert("char_start".to_string(), json!(meta.char_start));
    map.insert("char_end".to_string(), json!(meta.char_end));
    map.insert("hash".to_string(), json!(meta.hash));
    // Chroma metadata values must be scalars
    if !meta.tags.is_empty() {
        map.insert("tags".to_string(), json!(meta.tags.join(",")));
    }
    if let Some(ref category) = meta.category {
        map.insert("category".to_string(), json!(category));
    }
    map
}

fn from_chroma_metadata(value: Option<&Value>) -> ChunkMetadata {
    let Some(value) = value else {
        return ChunkMetadata::default();
    };
    let text = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let number = |key: &str| value.get(key).and_then(Value::as_u64).unwrap_or_default() as usize;

    ChunkMetadata {
        post_id: text("post_id"),
        title: text("title"),
        url: text("url"),
        chunk_index: number("chunk_index"),
        char_start: number("char_start"),
        char_end: number("char_end"),
        hash: text("hash"),
        tags: value
            .get("tags")
            .and_then(Value::as_str)
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        category: value.get("category").and_then(Value::as_str).map(str::to_string),
    }
}

#[async_trait::async_trait]
impl VectorIndex for ChromaIndex {
    fn backend_name(&self) -> &str {
        "chroma"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[tracing::instrument(skip(self, vector), fields(collection = %self.collection))]
    async fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<ScoredChunk>> {
        check_vector(vector, self.dimensions)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // Chroma rejects n_results larger than the collection
        let available = self.count().await?;
        if available == 0 {
            return Ok(Vec::new());
        }

        let path = self.collection_path("query").await?;
        let request = QueryRequest {
            query_embeddings: vec![vector],
            n_results: k.min(available),
            include: ["documents", "metadatas", "distances"],
        };
        let response: QueryResponse = self.post(&path, &request).await?;

        let ids = response.ids.into_iter().next().unwrap_or_default();
        let documents = response
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = response
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let distances = response
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        let hits = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| ScoredChunk {
                id,
                content: documents.get(i).cloned().flatten().unwrap_or_default(),
                metadata: from_chroma_metadata(metadatas.get(i).and_then(Option::as_ref)),
                score: distances
                    .get(i)
                    .copied()
                    .flatten()
                    .map_or(f32::NAN, |distance| 1.0 - distance),
            })
            .collect();

        Ok(top_k(hits, k))
    }

    async fn upsert(&self, chunk: &Chunk) -> AppResult<()> {
        self.upsert_batch(std::slice::from_ref(chunk)).await
    }

    async fn upsert_batch(&self, chunks: &[Chunk]) -> AppResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        for chunk in chunks {
            check_vector(&chunk.embedding, self.dimensions)?;
        }

        let request = UpsertRequest {
            ids: chunks.iter().map(|c| c.id.as_str()).collect(),
            embeddings: chunks.iter().map(|c| c.embedding.as_slice()).collect(),
            documents: chunks.iter().map(|c| c.content.as_str()).collect(),
            metadatas: chunks.iter().map(|c| to_chroma_metadata(&c.metadata)).collect(),
        };

        let path = self.collection_path("upsert").await?;
        let _: Value = self.post(&path, &request).await?;
        Ok(())
    }

    async fn delete(&self, chunk_id: &str) -> AppResult<bool> {
        let path = self.collection_path("get").await?;
        let existing: GetResponse = self
            .post(&path, &json!({ "ids": [chunk_id], "include": [] }))
            .await?;
        self.delete_ids(&existing.ids).await?;
        Ok(!existing.ids.is_empty())
    }

    async fn delete_post(&self, post_id: &str) -> AppResult<usize> {
        let existing = self.ids_where(Some(json!({ "post_id": post_id }))).await?;
        self.delete_ids(&existing.ids).await?;
        Ok(existing.ids.len())
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        let all = self.ids_where(None).await?;
        let posts: HashSet<String> = all
            .metadatas
            .unwrap_or_default()
            .iter()
            .map(|meta| from_chroma_metadata(meta.as_ref()).post_id)
            .collect();

        Ok(IndexStats {
            backend: self.backend_name().to_string(),
            chunks: all.ids.len(),
            posts: posts.len(),
            dimensions: self.dimensions,
            last_indexed_at: None,
        })
    }

    async fn reset(&self) -> AppResult<()> {
        let all = self.ids_where(None).await?;
        self.delete_ids(&all.ids).await?;
        tracing::info!("Reset Chroma collection '{}'", self.collection);
        Ok(())
    }
}

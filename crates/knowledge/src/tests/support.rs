//! Test doubles and fixtures shared by the pipeline tests.

use crate::embeddings::providers::TrigramProvider;
use crate::embeddings::{EmbedderHandle, EmbeddingProvider};
use crate::ingest::Ingestor;
use crate::memory_index::MemoryIndex;
use crate::rag::SearchPipeline;
use crate::types::{Chunk, IndexStats, Post, ScoredChunk};
use crate::vector_index::VectorIndex;
use blogsearch_core::config::{GeneratorSettings, IngestSettings, SearchSettings};
use blogsearch_core::{AppError, AppResult};
use blogsearch_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use blogsearch_prompt::{default_definition, PromptAssembler};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const DIMS: usize = 256;

/// What a [`ScriptedLlm`] does when called.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Answer(String),
    Fail(String),
    Empty,
    /// Never completes
    Hang,
}

/// Generator that replays a fixed reply and records its requests.
#[derive(Debug)]
pub(crate) struct ScriptedLlm {
    reply: Reply,
    calls: AtomicUsize,
    last: Mutex<Option<LlmRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub(crate) fn answering(text: &str) -> Self {
        Self::new(Reply::Answer(text.to_string()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<LlmRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());

        let content = match &self.reply {
            Reply::Answer(text) => text.clone(),
            Reply::Empty => String::new(),
            Reply::Fail(reason) => return Err(AppError::Llm(reason.clone())),
            Reply::Hang => futures::future::pending().await,
        };
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

/// How a [`ScriptedIndex`] answers queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryMode {
    Normal,
    Fail,
    Hang,
}

/// Memory index whose queries can be made to fail or hang.
#[derive(Debug)]
pub(crate) struct ScriptedIndex {
    inner: MemoryIndex,
    mode: QueryMode,
    queries: AtomicUsize,
}

impl ScriptedIndex {
    pub(crate) fn new(mode: QueryMode) -> Self {
        Self {
            inner: MemoryIndex::new(DIMS),
            mode,
            queries: AtomicUsize::new(0),
        }
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VectorIndex for ScriptedIndex {
    fn backend_name(&self) -> &str {
        "scripted"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<ScoredChunk>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            QueryMode::Normal => self.inner.query(vector, k).await,
            QueryMode::Fail => Err(AppError::Index("vector store unreachable".to_string())),
            QueryMode::Hang => futures::future::pending().await,
        }
    }

    async fn upsert(&self, chunk: &Chunk) -> AppResult<()> {
        self.inner.upsert(chunk).await
    }

    async fn delete(&self, chunk_id: &str) -> AppResult<bool> {
        self.inner.delete(chunk_id).await
    }

    async fn delete_post(&self, post_id: &str) -> AppResult<usize> {
        self.inner.delete_post(post_id).await
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        self.inner.stats().await
    }

    async fn reset(&self) -> AppResult<()> {
        self.inner.reset().await
    }
}

/// Provider whose model never loads.
#[derive(Debug)]
pub(crate) struct UnreachableProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for UnreachableProvider {
    fn provider_name(&self) -> &str {
        "unreachable"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Embedding("connection refused".to_string()))
    }
}

pub(crate) fn embedder() -> EmbedderHandle {
    EmbedderHandle::ready_now(Arc::new(TrigramProvider::new(DIMS)))
}

/// Three published posts on unrelated topics.
pub(crate) fn fixture_posts() -> Vec<Post> {
    [
        (
            "p-ai",
            "AI và báo chí",
            "ai-va-bao-chi",
            "<p>Trí tuệ nhân tạo AI đang thay đổi ngành báo chí.</p>\
             <p>Các tòa soạn dùng công nghệ AI mới nhất để tóm tắt tin tức.</p>",
        ),
        (
            "p-football",
            "Bóng đá",
            "bong-da",
            "<p>Đội tuyển bóng đá Việt Nam thắng trận chung kết.</p>\
             <p>Người hâm mộ ăn mừng trên khắp các con phố.</p>",
        ),
        (
            "p-pho",
            "Phở Hà Nội",
            "pho-ha-noi",
            "<p>Phở bò Hà Nội nổi tiếng với nước dùng trong.</p>\
             <p>Quán phở truyền thống mở cửa từ sáng sớm.</p>",
        ),
    ]
    .into_iter()
    .map(|(id, title, slug, content)| {
        serde_json::from_value(json!({
            "_id": id,
            "title": title,
            "slug": slug,
            "content": content,
            "status": "published"
        }))
        .unwrap()
    })
    .collect()
}

/// Ingest the fixture posts, one chunk per post.
pub(crate) async fn seed(index: Arc<dyn VectorIndex>) {
    let ingestor = Ingestor::new(embedder(), index, IngestSettings::default()).unwrap();
    for post in fixture_posts() {
        assert_eq!(ingestor.upsert_post(&post).await.unwrap(), 1);
    }
}

pub(crate) fn build_pipeline(
    index: Arc<dyn VectorIndex>,
    llm: Arc<ScriptedLlm>,
    search: &SearchSettings,
) -> SearchPipeline {
    let assembler = PromptAssembler::new(default_definition(), search.context_budget_chars).unwrap();
    SearchPipeline::new(
        embedder(),
        index,
        assembler,
        llm,
        search,
        &GeneratorSettings::default(),
    )
    .unwrap()
}

/// Pipeline over a seeded memory index with default settings.
pub(crate) async fn pipeline_with(llm: ScriptedLlm) -> (SearchPipeline, Arc<ScriptedLlm>) {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIMS));
    seed(Arc::clone(&index)).await;
    let llm = Arc::new(llm);
    let pipeline = build_pipeline(index, Arc::clone(&llm), &SearchSettings::default());
    (pipeline, llm)
}

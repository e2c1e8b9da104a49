//! End-to-end search pipeline scenarios.

use super::support::*;
use crate::embeddings::EmbedderHandle;
use crate::memory_index::MemoryIndex;
use crate::rag::{AnswerStatus, PipelineStage, SearchError, StageTimeouts, ANSWER_UNAVAILABLE};
use crate::vector_index::VectorIndex;
use blogsearch_core::config::{GeneratorSettings, SearchSettings};
use blogsearch_prompt::{default_definition, PromptAssembler, DEFAULT_FALLBACK};
use std::sync::Arc;
use std::time::Duration;

fn short_timeouts() -> StageTimeouts {
    StageTimeouts {
        embed: Duration::from_secs(5),
        retrieval: Duration::from_millis(100),
        generation: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_keyword_query_skips_generation() {
    let (pipeline, llm) = pipeline_with(ScriptedLlm::answering("không dùng")).await;

    let response = pipeline.search("Công nghệ AI mới nhất").await.unwrap();

    assert!(!response.is_question);
    assert_eq!(response.answer_status, AnswerStatus::Skipped);
    assert_eq!(response.answer, "");
    assert_eq!(response.chunks[0].metadata.post_id, "p-ai");
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_question_generates_grounded_answer() {
    let answer = "Các tòa soạn dùng công nghệ AI để tóm tắt tin tức.";
    let (pipeline, llm) = pipeline_with(ScriptedLlm::answering(answer)).await;

    let response = pipeline
        .search("AI sẽ thay đổi ngành báo chí như thế nào?")
        .await
        .unwrap();

    assert!(response.is_question);
    assert_eq!(response.answer_status, AnswerStatus::Generated);
    assert_eq!(response.answer, answer);
    assert_eq!(response.chunks[0].metadata.post_id, "p-ai");
    assert_eq!(llm.calls(), 1);

    let context: String = response
        .chunks
        .iter()
        .map(|hit| hit.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    for word in answer.trim_end_matches('.').split_whitespace() {
        assert!(context.contains(&word.to_lowercase()), "{} not in context", word);
    }
    assert_eq!(response.grounding, Some(1.0));
}

#[tokio::test]
async fn test_empty_query_runs_no_stage() {
    let index = Arc::new(ScriptedIndex::new(QueryMode::Normal));
    let llm = Arc::new(ScriptedLlm::answering("x"));
    let pipeline = build_pipeline(index.clone(), Arc::clone(&llm), &SearchSettings::default());

    let err = pipeline.search("").await.unwrap_err();

    assert!(matches!(err, SearchError::InvalidInput(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(index.queries(), 0);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_vector_store_failure_is_fatal() {
    let index = Arc::new(ScriptedIndex::new(QueryMode::Fail));
    let llm = Arc::new(ScriptedLlm::answering("x"));
    let pipeline = build_pipeline(index.clone(), Arc::clone(&llm), &SearchSettings::default());

    let err = pipeline.search("AI là gì?").await.unwrap_err();

    assert!(matches!(
        err,
        SearchError::RetrievalUnavailable {
            stage: PipelineStage::Retrieving,
            ..
        }
    ));
    assert_eq!(err.status_code(), 500);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_vector_store_timeout_is_fatal() {
    let index = Arc::new(ScriptedIndex::new(QueryMode::Hang));
    let llm = Arc::new(ScriptedLlm::answering("x"));
    let pipeline = build_pipeline(index.clone(), Arc::clone(&llm), &SearchSettings::default())
        .with_timeouts(short_timeouts());

    let err = pipeline.search("AI là gì?").await.unwrap_err();

    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains("timed out"));
    assert_eq!(index.queries(), 1);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_generation_timeout_keeps_chunks() {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIMS));
    seed(Arc::clone(&index)).await;
    let llm = Arc::new(ScriptedLlm::new(Reply::Hang));
    let pipeline = build_pipeline(index, Arc::clone(&llm), &SearchSettings::default())
        .with_timeouts(short_timeouts());

    let response = pipeline
        .search("AI sẽ thay đổi ngành báo chí như thế nào?")
        .await
        .unwrap();

    assert_eq!(response.chunks.len(), 3);
    assert_eq!(response.answer, ANSWER_UNAVAILABLE);
    assert_eq!(response.answer_status, AnswerStatus::Unavailable);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_generation_errors_degrade_to_placeholder() {
    for reply in [Reply::Fail("502 Bad Gateway".to_string()), Reply::Empty] {
        let (pipeline, _) = pipeline_with(ScriptedLlm::new(reply)).await;
        let response = pipeline.search("Phở Hà Nội ngon không?").await.unwrap();
        assert_eq!(response.answer, ANSWER_UNAVAILABLE);
        assert!(!response.chunks.is_empty());
    }
}

#[tokio::test]
async fn test_empty_index_answers_with_fallback() {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIMS));
    let llm = Arc::new(ScriptedLlm::answering("x"));
    let pipeline = build_pipeline(index, Arc::clone(&llm), &SearchSettings::default());

    let response = pipeline.search("AI là gì?").await.unwrap();
    assert!(response.chunks.is_empty());
    assert_eq!(response.answer, DEFAULT_FALLBACK);
    assert_eq!(response.answer_status, AnswerStatus::NoContext);

    let keyword = pipeline.search("AI").await.unwrap();
    assert!(keyword.chunks.is_empty());
    assert_eq!(keyword.answer, "");
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_min_score_filters_hits() {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIMS));
    seed(Arc::clone(&index)).await;
    let llm = Arc::new(ScriptedLlm::answering("x"));
    let search = SearchSettings {
        min_score: Some(1.1),
        ..Default::default()
    };
    let pipeline = build_pipeline(index, Arc::clone(&llm), &search);

    let response = pipeline.search("Công nghệ AI").await.unwrap();
    assert!(response.chunks.is_empty());
}

#[tokio::test]
async fn test_top_k_bounds_results() {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIMS));
    seed(Arc::clone(&index)).await;
    let search = SearchSettings {
        top_k: 2,
        ..Default::default()
    };
    let pipeline = build_pipeline(index, Arc::new(ScriptedLlm::answering("x")), &search);

    let response = pipeline.search("bóng đá").await.unwrap();
    assert_eq!(response.chunks.len(), 2);
    assert!(response.chunks[0].score >= response.chunks[1].score);
    assert_eq!(response.chunks[0].metadata.post_id, "p-football");
}

#[tokio::test]
async fn test_repeated_query_is_deterministic() {
    let (pipeline, _) = pipeline_with(ScriptedLlm::answering("x")).await;

    let first = pipeline.search("phở bò").await.unwrap();
    let second = pipeline.search("phở bò").await.unwrap();
    assert_eq!(first.chunks, second.chunks);
}

#[tokio::test]
async fn test_embedder_not_ready_is_unavailable() {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIMS));
    let embedder = EmbedderHandle::spawn(Arc::new(UnreachableProvider), Duration::from_secs(60));
    let search = SearchSettings::default();
    let pipeline = crate::rag::SearchPipeline::new(
        embedder,
        index,
        PromptAssembler::new(default_definition(), search.context_budget_chars).unwrap(),
        Arc::new(ScriptedLlm::answering("x")),
        &search,
        &GeneratorSettings::default(),
    )
    .unwrap();

    let err = pipeline.search("AI là gì?").await.unwrap_err();
    assert!(matches!(err, SearchError::EmbedderNotReady(_)));
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn test_ask_uses_best_chunk() {
    let (pipeline, llm) = pipeline_with(ScriptedLlm::answering("Phở bò có nước dùng trong.")).await;

    let response = pipeline.ask("Phở bò Hà Nội có gì đặc biệt?").await.unwrap();

    assert_eq!(response.query, "Phở bò Hà Nội có gì đặc biệt?");
    assert!(response.context.contains("Phở bò Hà Nội"));
    assert_eq!(response.answer, "Phở bò có nước dùng trong.");

    let system = llm.last_request().unwrap().system.unwrap();
    assert!(system.contains("Nội dung bài viết 1:"));
    assert!(!system.contains("Nội dung bài viết 2:"));
}

#[tokio::test]
async fn test_ask_without_hits_has_empty_context() {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIMS));
    let llm = Arc::new(ScriptedLlm::answering("x"));
    let pipeline = build_pipeline(index, Arc::clone(&llm), &SearchSettings::default());

    let response = pipeline.ask("AI là gì?").await.unwrap();
    assert_eq!(response.context, "");
    assert_eq!(response.answer, DEFAULT_FALLBACK);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_searches() {
    let (pipeline, _) = pipeline_with(ScriptedLlm::answering("x")).await;
    let expected = pipeline.search("bóng đá Việt Nam").await.unwrap().chunks;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.search("bóng đá Việt Nam").await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().unwrap().chunks, expected);
    }
}

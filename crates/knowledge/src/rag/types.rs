//! Search request and response schemas.

use crate::types::{ChunkMetadata, ScoredChunk};
use serde::{Deserialize, Serialize};

/// Answer used when generation fails after a successful retrieval.
pub const ANSWER_UNAVAILABLE: &str = "answer unavailable";

/// Body of `POST /search` and `POST /ask`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

/// A retrieved chunk as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

impl From<ScoredChunk> for SearchHit {
    fn from(chunk: ScoredChunk) -> Self {
        Self {
            content: chunk.content,
            metadata: chunk.metadata,
            score: chunk.score,
        }
    }
}

/// How the `answer` field of a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerStatus {
    /// The generator answered from the retrieved context
    Generated,
    /// Keyword query; generation was not attempted
    Skipped,
    /// Nothing was retrieved; the answer is the fallback phrase
    NoContext,
    /// Generation failed; the answer is a placeholder
    Unavailable,
}

/// Response of `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub chunks: Vec<SearchHit>,
    pub answer: String,
    pub is_question: bool,
    pub answer_status: AnswerStatus,

    /// Share of answer words found in the context, for generated answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<f32>,
}

/// Response of `POST /ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub query: String,

    /// Content of the best chunk, empty when nothing was retrieved
    pub context: String,

    pub answer: String,
}

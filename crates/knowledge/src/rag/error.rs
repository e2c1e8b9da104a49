//! Request-level error taxonomy of the search pipeline.

use crate::embeddings::EmbedError;
use serde::Serialize;
use std::fmt;

/// Stage of one pipeline execution.
///
/// Stages advance linearly; any stage may end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Idle,
    Embedding,
    Retrieving,
    Assembling,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors that end a search request.
///
/// An empty retrieval is not an error, and a generation failure is
/// absorbed into the response by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedder not ready: {0}")]
    EmbedderNotReady(String),

    /// Embedding or retrieval failed or timed out.
    #[error("Retrieval unavailable at {stage}: {reason}")]
    RetrievalUnavailable { stage: PipelineStage, reason: String },

    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),
}

impl SearchError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::EmbedderNotReady(_) => 503,
            Self::RetrievalUnavailable { .. } | Self::GenerationUnavailable(_) => 500,
        }
    }

    pub(crate) fn retrieval(stage: PipelineStage, reason: impl fmt::Display) -> Self {
        Self::RetrievalUnavailable {
            stage,
            reason: reason.to_string(),
        }
    }
}

impl From<EmbedError> for SearchError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::NotReady(reason) => Self::EmbedderNotReady(reason),
            EmbedError::Failed(err) => Self::retrieval(PipelineStage::Embedding, err),
        }
    }
}

//! Retrieval-augmented search over blog posts.
//!
//! [`SearchPipeline`] runs one request through the stages
//! `Embedding -> Retrieving -> Assembling -> Generating`. Embedding and
//! retrieval failures end the request; generation failures degrade to a
//! placeholder answer next to the retrieved chunks.

pub mod classify;
pub mod error;
pub mod grounding;
pub mod pipeline;
pub mod types;

pub use classify::QuestionClassifier;
pub use error::{PipelineStage, SearchError};
pub use grounding::grounding_ratio;
pub use pipeline::{SearchPipeline, StageTimeouts};
pub use types::{
    AnswerStatus, AskResponse, QueryRequest, SearchHit, SearchResponse, ANSWER_UNAVAILABLE,
};

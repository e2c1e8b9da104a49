//! Error types shared by every blogsearch crate.
//!
//! This module defines a unified error enum that covers the infrastructure
//! error categories: configuration, I/O, embeddings, vector indexes, language
//! models, prompts and ingestion. The search pipeline maps these onto its own
//! request-level taxonomy at the orchestrator boundary.

use thiserror::Error;

/// Unified error type for blogsearch.
///
/// Library functions return `Result<T, AppError>` and propagate with `?`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index errors (unreachable store, bad dimension, storage failure)
    #[error("Index error: {0}")]
    Index(String),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Post ingestion errors
    #[error("Ingest error: {0}")]
    Ingest(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

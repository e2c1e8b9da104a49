//! Blog post search index and retrieval-augmented answering.
//!
//! Posts are cleaned, chunked by sentence and embedded by [`ingest`], stored
//! in a [`VectorIndex`] backend (memory, SQLite or Chroma) and queried by the
//! [`rag::SearchPipeline`], which assembles a grounded prompt for the
//! configured generator.

pub mod chroma_index;
pub mod embeddings;
pub mod ingest;
pub mod memory_index;
pub mod rag;
pub mod sqlite_index;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{EmbedError, EmbedderHandle, EmbeddingProvider, Readiness};
pub use ingest::{EtlOutcome, EtlRequest, Ingestor};
pub use rag::{SearchError, SearchPipeline};
pub use types::{Chunk, ChunkMetadata, IndexStats, Post, ScoredChunk};
pub use vector_index::{create_index, VectorIndex};

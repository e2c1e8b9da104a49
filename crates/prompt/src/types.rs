//! Prompt types for blogsearch.
//!
//! This module defines the prompt definition loaded from YAML and the
//! assembled prompt handed to the generator.

use serde::{Deserialize, Serialize};

/// A grounded-answer prompt definition.
///
/// Templates use Handlebars syntax. Available variables:
/// - `system`: `{{context}}`, `{{fallback}}`
/// - `template` (user message): `{{query}}`, `{{fallback}}`
/// - `chunkLabel`: `{{ordinal}}` (1-based rank), `{{content}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Sentence the model must reply with when the context has no answer
    pub fallback: String,

    /// System message template
    pub system: String,

    /// User message template
    pub template: String,

    /// Per-chunk template
    #[serde(rename = "chunkLabel", default = "default_chunk_label")]
    pub chunk_label: String,

    /// Separator between labelled chunks
    #[serde(rename = "chunkSeparator", default = "default_chunk_separator")]
    pub chunk_separator: String,
}

fn default_chunk_label() -> String {
    "[{{ordinal}}] {{content}}".to_string()
}

fn default_chunk_separator() -> String {
    "\n".to_string()
}

/// A fully assembled prompt ready for the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledPrompt {
    /// System message carrying the instructions and the context block
    pub system: String,

    /// User message carrying the query
    pub user: String,

    /// Metadata about the assembly
    pub metadata: AssembledPromptMetadata,
}

/// Metadata about an assembled prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Chunks offered to the assembler
    #[serde(rename = "chunksSupplied")]
    pub chunks_supplied: usize,

    /// Chunks that made it into the context block
    #[serde(rename = "chunksIncluded")]
    pub chunks_included: usize,

    /// Whether any chunk was dropped or cut to respect the budget
    pub truncated: bool,

    /// Length of the rendered context block in characters
    #[serde(rename = "contextChars")]
    pub context_chars: usize,
}

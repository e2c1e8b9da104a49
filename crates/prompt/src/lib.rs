//! Grounded prompt assembly for blogsearch.
//!
//! This crate turns ranked retrieval results and a user query into the
//! system/user message pair sent to the generator:
//! - YAML-based prompt definitions (built-in Vietnamese default)
//! - Handlebars template rendering
//! - Context budgeting (lowest-ranked chunks dropped first)

pub mod assembler;
pub mod loader;
pub mod types;

// Re-export main types
pub use assembler::PromptAssembler;
pub use loader::{
    default_definition, list_prompts, load_prompt, resolve_prompt, DEFAULT_FALLBACK, DEFAULT_PROMPT_ID,
};
pub use types::{AssembledPrompt, AssembledPromptMetadata, PromptDefinition};

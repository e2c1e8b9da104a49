//! Text generation crate for blogsearch.
//!
//! This crate provides a provider-agnostic abstraction for calling the
//! language model that writes answers from retrieved context.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **OpenAI-compatible**: any `/chat/completions` host (OpenRouter by default)
//!
//! # Example
//! ```no_run
//! use blogsearch_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Xin chào", "llama3");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;

//! Generator factory.
//!
//! Creates an LLM client from the generator settings: provider resolution,
//! endpoint defaults and secret injection.

use crate::client::LlmClient;
use crate::providers::{ollama, openai, OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use blogsearch_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key (required by "openai")
/// * `timeout` - Per-request HTTP timeout
///
/// # Errors
/// Returns error if the provider is unknown, a required secret is missing,
/// or the HTTP client cannot be built.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(provider) {
        Some(ProviderType::Ollama) => {
            let base_url = endpoint.unwrap_or(ollama::DEFAULT_OLLAMA_URL);
            let client = OllamaClient::with_timeout(base_url, timeout)?;
            Ok(Arc::new(client))
        }
        Some(ProviderType::OpenAI) => {
            let api_key = api_key
                .ok_or_else(|| AppError::Config("OpenAI provider requires API key".to_string()))?;
            let base_url = endpoint.unwrap_or(openai::DEFAULT_OPENAI_URL);
            let client = OpenAiClient::with_timeout(base_url, api_key, timeout)?;
            Ok(Arc::new(client))
        }
        None => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}

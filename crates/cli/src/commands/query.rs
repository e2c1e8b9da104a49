//! Search and ask command handlers.
//!
//! One-shot versions of `POST /search` and `POST /ask`: build the services,
//! wait for the embedder, run a single query and print the result.

use super::{print_json, wait_for_embedder};
use crate::app::App;
use blogsearch_core::AppConfig;
use blogsearch_knowledge::rag::{AnswerStatus, SearchResponse};
use clap::Args;
use std::time::Duration;

/// Search the index and answer questions
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Search query or question
    pub query: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let app = App::from_config(config)?;
        wait_for_embedder(&app, embed_wait(config)).await?;

        let response = app.pipeline.search(&self.query).await?;
        if self.json {
            return print_json(&response);
        }
        print_search(&response);
        Ok(())
    }
}

/// Answer a question from the single best matching chunk
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Question text
    pub query: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let app = App::from_config(config)?;
        wait_for_embedder(&app, embed_wait(config)).await?;

        let response = app.pipeline.ask(&self.query).await?;
        if self.json {
            return print_json(&response);
        }
        if !response.context.is_empty() {
            println!("Context: {}\n", response.context);
        }
        println!("{}", response.answer);
        Ok(())
    }
}

/// A cold model can take a while to load; allow a few embed timeouts.
fn embed_wait(config: &AppConfig) -> Duration {
    Duration::from_secs(config.search.embed_timeout_secs.saturating_mul(4))
}

fn print_search(response: &SearchResponse) {
    if response.chunks.is_empty() {
        println!("No matching posts.");
    }
    for (i, hit) in response.chunks.iter().enumerate() {
        println!(
            "{}. {} ({}) score={:.3}",
            i + 1,
            hit.metadata.title,
            hit.metadata.url,
            hit.score
        );
        println!("   {}", hit.content);
    }

    if response.answer_status != AnswerStatus::Skipped {
        println!("\n{}", response.answer);
    }
}

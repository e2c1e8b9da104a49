//! Stats command handler.

use super::{print_json, require_persistent_index};
use blogsearch_core::AppConfig;
use blogsearch_knowledge::create_index;
use clap::Args;

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        require_persistent_index(config, "stats")?;
        let stats = create_index(config)?.stats().await?;
        if self.json {
            return print_json(&stats);
        }

        println!("Backend:    {}", stats.backend);
        println!("Posts:      {}", stats.posts);
        println!("Chunks:     {}", stats.chunks);
        println!("Dimensions: {}", stats.dimensions);
        if let Some(at) = stats.last_indexed_at {
            println!("Last write: {}", at.to_rfc3339());
        }
        Ok(())
    }
}

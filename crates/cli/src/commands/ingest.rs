//! Ingest and delete command handlers.

use super::{print_json, require_persistent_index, wait_for_embedder};
use crate::app::App;
use blogsearch_core::AppConfig;
use blogsearch_knowledge::{create_index, EtlRequest};
use blogsearch_knowledge::ingest::load_requests;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Index posts from a JSON file or directory
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// JSON file or directory of JSON files
    pub path: PathBuf,

    /// Clear the index before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Seconds to wait for the embedding model
    #[arg(long, default_value = "120")]
    pub ready_timeout: u64,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestSummary {
    requests: usize,
    succeeded: usize,
    failed: usize,
    chunks_written: usize,
    chunks_deleted: usize,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        require_persistent_index(config, "ingest")?;
        let requests = load_requests(&self.path)?;
        tracing::info!(requests = requests.len(), path = %self.path.display(), "Loaded requests");

        let app = App::from_config(config)?;
        if self.reset {
            tracing::warn!("Resetting index");
            app.index().reset().await?;
        }
        wait_for_embedder(&app, Duration::from_secs(self.ready_timeout)).await?;

        let mut summary = IngestSummary {
            requests: requests.len(),
            ..Default::default()
        };
        for request in &requests {
            match app.ingestor.process(request).await {
                Ok(outcome) => {
                    summary.succeeded += 1;
                    match request {
                        EtlRequest::Upsert(_) => {
                            summary.chunks_written += outcome.chunks
                        }
                        EtlRequest::Delete(_) => {
                            summary.chunks_deleted += outcome.chunks
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(post_id = request.post_id(), "Failed to ingest: {}", e);
                }
            }
        }

        if self.json {
            print_json(&summary)?;
        } else {
            println!(
                "Processed {} requests: {} chunks written, {} deleted, {} failed",
                summary.requests, summary.chunks_written, summary.chunks_deleted, summary.failed
            );
        }

        if summary.failed > 0 {
            anyhow::bail!("{} of {} requests failed", summary.failed, summary.requests);
        }
        Ok(())
    }
}

/// Remove a post from the index
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Post identifier
    pub post_id: String,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        require_persistent_index(config, "delete")?;
        let index = create_index(config)?;
        let removed = index.delete_post(&self.post_id).await?;
        tracing::info!(post_id = %self.post_id, removed, "Deleted post");
        println!("Removed {} chunks for post {}", removed, self.post_id);
        Ok(())
    }
}

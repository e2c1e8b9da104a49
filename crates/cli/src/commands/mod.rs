//! Command handlers for the blogsearch CLI.

pub mod ingest;
pub mod query;
pub mod serve;
pub mod stats;

pub use ingest::{DeleteCommand, IngestCommand};
pub use query::{AskCommand, SearchCommand};
pub use serve::ServeCommand;
pub use stats::StatsCommand;

use crate::app::App;
use anyhow::Context;
use blogsearch_core::AppConfig;
use std::time::Duration;

/// Fail for index maintenance commands that would work on a throwaway index.
///
/// The memory backend lives only as long as the process, so one-shot
/// `ingest`, `delete` and `stats` runs against it would report on data that
/// is discarded on exit.
pub(crate) fn require_persistent_index(config: &AppConfig, command: &str) -> anyhow::Result<()> {
    if config.index.backend == "memory" {
        anyhow::bail!(
            "`{}` needs a persistent index; the memory backend is discarded when the command exits (use --index sqlite or chroma)",
            command
        );
    }
    Ok(())
}

/// Block until the embedding model is loaded, or give up after `limit`.
pub(crate) async fn wait_for_embedder(app: &App, limit: Duration) -> anyhow::Result<()> {
    tracing::info!("Waiting for embedding model");
    tokio::time::timeout(limit, app.embedder().ready())
        .await
        .with_context(|| format!("embedding model not ready after {:?}", limit))??;
    Ok(())
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Serve command handler.

use super::wait_for_embedder;
use crate::app::App;
use crate::server;
use blogsearch_core::AppConfig;
use clap::Args;
use std::time::Duration;

/// Run the HTTP API
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Wait for the embedding model before accepting requests
    #[arg(long)]
    pub wait_ready: bool,

    /// Seconds to wait with --wait-ready
    #[arg(long, default_value = "120")]
    pub ready_timeout: u64,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::debug!("Serve options: {:?}", self);
        let app = App::from_config(config)?;

        if self.wait_ready {
            wait_for_embedder(&app, Duration::from_secs(self.ready_timeout)).await?;
        }

        server::serve(app, &config.server.bind).await
    }
}

//! Blogsearch CLI
//!
//! Semantic search and question answering over blog posts. Runs the HTTP
//! API (`serve`) or one-shot queries and index maintenance commands.

mod app;
mod commands;
mod server;

use blogsearch_core::config::{AppConfig, CliOverrides};
use blogsearch_core::logging::{self, LogFormat};
use blogsearch_core::AppError;
use clap::{Parser, Subcommand};
use commands::{
    AskCommand, DeleteCommand, IngestCommand, SearchCommand, ServeCommand, StatsCommand,
};
use std::path::PathBuf;
use tracing::Instrument;

/// Blogsearch - semantic search and answers over blog posts
#[derive(Parser, Debug)]
#[command(name = "blogsearch")]
#[command(about = "Semantic search and question answering over blog posts", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "BLOGSEARCH_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "BLOGSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Address for the HTTP API
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Vector index backend (memory, sqlite, chroma)
    #[arg(long, global = true)]
    index: Option<String>,

    /// Answer generator (ollama, openai)
    #[arg(short, long, global = true)]
    generator: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Number of chunks retrieved per query
    #[arg(long, global = true)]
    top_k: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeCommand),

    /// Search posts; questions also get a generated answer
    Search(SearchCommand),

    /// Answer a question from the best matching post
    Ask(AskCommand),

    /// Index posts from JSON files
    Ingest(IngestCommand),

    /// Remove a post from the index
    Delete(DeleteCommand),

    /// Show index statistics
    Stats(StatsCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Serve(_) => "serve",
            Self::Search(_) => "search",
            Self::Ask(_) => "ask",
            Self::Ingest(_) => "ingest",
            Self::Delete(_) => "delete",
            Self::Stats(_) => "stats",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // clap has already folded the workspace and config variables into `cli`
    let workspace = cli.workspace.clone();
    let config_file = cli.config.clone();
    let config = AppConfig::load_with(|key| match key {
        "BLOGSEARCH_WORKSPACE" => workspace.as_ref().map(|p| p.display().to_string()),
        "BLOGSEARCH_CONFIG" => config_file.as_ref().map(|p| p.display().to_string()),
        _ => std::env::var(key).ok(),
    })?;

    let config = config.with_overrides(CliOverrides {
        workspace: cli.workspace,
        config_file: cli.config,
        bind: cli.bind,
        index_backend: cli.index,
        generator_provider: cli.generator,
        generator_model: cli.model,
        top_k: cli.top_k,
        log_level: cli.log_level,
        log_format: cli.log_format,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });

    let format = LogFormat::parse(&config.log_format).ok_or_else(|| {
        AppError::Config(format!("Unknown log format: {}", config.log_format))
    })?;
    logging::init_logging(config.log_level.as_deref(), format, config.no_color)?;

    tracing::info!("Blogsearch starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        index = %config.index.backend,
        embedding = %config.embedding.provider,
        generator = %config.generator.provider,
        "Configured backends"
    );

    config.ensure_state_dir()?;

    let span = tracing::info_span!("command", name = cli.command.name());
    let result = async {
        match cli.command {
            Commands::Serve(cmd) => cmd.execute(&config).await,
            Commands::Search(cmd) => cmd.execute(&config).await,
            Commands::Ask(cmd) => cmd.execute(&config).await,
            Commands::Ingest(cmd) => cmd.execute(&config).await,
            Commands::Delete(cmd) => cmd.execute(&config).await,
            Commands::Stats(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(span.clone())
    .await;

    span.in_scope(|| match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    });

    result
}

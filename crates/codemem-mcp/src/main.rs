//! Codemem MCP server.
//!
//! Long-lived subprocess speaking line-delimited JSON-RPC over stdio.
//! Records per-project development context into a local SQLite store
//! and answers hybrid semantic queries (vector similarity + keyword
//! baseline + metadata relevance).

mod protocol;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use codemem_core::{MemoryConfig, MemoryService};

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

#[derive(Debug, Parser)]
#[command(name = "codemem-mcp", version, about = "Developer memory MCP server")]
struct Cli {
    /// Database file (default: ~/.devmind/memory.db)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON configuration file (partial configs are fine)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable vector search for this run (keyword + metadata only)
    #[arg(long)]
    no_embeddings: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<MemoryConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => MemoryConfig::default(),
    };
    if cli.db_path.is_some() {
        config.database_path = cli.db_path.clone();
    }
    if cli.no_embeddings {
        config.vector_search.enabled = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging goes to stderr; stdout belongs to JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("codemem-mcp v{} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let service = match MemoryService::new(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("failed to initialize the memory engine: {}", e);
            std::process::exit(1);
        }
    };
    info!("storage ready at {}", service.db().path().display());

    // Warm the embedding model off the handshake path
    if service.embeddings().is_enabled() {
        let warmup = Arc::clone(&service);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            let provider = Arc::clone(&warmup);
            let result =
                tokio::task::spawn_blocking(move || provider.embeddings().initialize()).await;
            match result {
                Ok(Ok(())) => {
                    info!("embedding model ready");
                    // Work through any backlog left by earlier runs
                    match warmup.regenerate_embeddings(200).await {
                        Ok(report) if report.generated > 0 || report.failed > 0 => info!(
                            "embedding backlog: {} generated, {} failed",
                            report.generated, report.failed
                        ),
                        Ok(_) => {}
                        Err(e) => error!("embedding backlog pass failed: {}", e),
                    }
                }
                Ok(Err(e)) => error!(
                    "embedding model failed to load: {} - semantic_search will be unavailable",
                    e
                ),
                Err(e) => error!("embedding warmup task panicked: {}", e),
            }
        });
    }

    let server = McpServer::new(Arc::clone(&service));
    let transport = StdioTransport::new();

    info!("serving on stdio");
    if let Err(e) = transport.run(server).await {
        error!("transport error: {}", e);
    }

    // Drain in-flight embedding tasks, then close the store
    service.shutdown().await;
    info!("codemem-mcp shut down");
    Ok(())
}

//! Idea intake service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ request-id ─▶ trace ─▶ metrics ─▶ catch-panic ─▶ timeout
//!                                                                   │
//!           ┌───────────────────────────────────────────────────────┘
//!           ▼
//!     session + CSRF ─▶ security headers ─▶ rate limit ─▶ CORS ─▶ cache ─▶ handlers
//!           │                                   │                  │
//!           ▼                                   ▼                  ▼
//!     sessions (SQLite)                  token buckets       cached bodies
//! ```
//!
//! Background sweeps evict expired sessions, CSRF tokens, idle buckets and
//! stale cache entries. On shutdown they stop in reverse dependency order
//! before the database pool is closed.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use idea_intake::config::{load_config, AppConfig};
use idea_intake::db;
use idea_intake::ideas::SqliteIdeaRepository;
use idea_intake::lifecycle::{wait_for_signal, Shutdown};
use idea_intake::observability::logging::init_logging;
use idea_intake::{HttpServer, Pipeline};

#[derive(Parser)]
#[command(name = "idea-intake")]
#[command(about = "Session-aware idea intake API", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!(
        environment = %config.environment,
        bind_address = %config.listener.bind_address,
        database = %config.database.url,
        "idea-intake v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let pool = db::connect(&config.database).await?;
    let ideas = Arc::new(SqliteIdeaRepository::new(pool.clone()).await?);
    let pipeline = Arc::new(Pipeline::new(config.clone(), pool).await?);
    pipeline.start();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(pipeline.clone(), ideas);
    let server_handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
    }

    pipeline.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

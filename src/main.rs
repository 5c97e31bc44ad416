//! Rally server — event reminder scheduling and push notification fan-out.
//!
//! Usage:
//!   rally                        # start with ~/.rally/config.toml
//!   rally --port 8080            # override the gateway port
//!   rally --db ./rally.db        # override the store path

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rally_core::RallyConfig;
use rally_gateway::AppState;
use rally_push::{Dispatcher, HttpPushGateway};
use rally_reminders::{ReminderRunner, spawn_runner};
use rally_store::DocStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rally",
    version,
    about = "Event reminder & push notification service"
)]
struct Cli {
    /// Config file path (default: ~/.rally/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway port override
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database path override
    #[arg(long)]
    db: Option<PathBuf>,

    /// Seconds between due-reminder scans
    #[arg(long)]
    runner_interval: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug,tower_http=debug,hyper=info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => RallyConfig::load_from(path)?,
        None => RallyConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db) = &cli.db {
        config.store.path = db.to_string_lossy().into_owned();
    }
    if let Some(secs) = cli.runner_interval {
        config.runner.interval_secs = secs;
    }

    let store = Arc::new(DocStore::open(Path::new(&config.store.path))?);
    tracing::info!("💾 document store ready: {}", config.store.path);

    if config.push.resolve_api_key().is_empty() {
        tracing::warn!("⚠️ push gateway api key is empty — pushes will likely be rejected");
    }
    let gateway_client = Arc::new(HttpPushGateway::new(&config.push));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), gateway_client));

    let runner = Arc::new(ReminderRunner::new(
        store.clone(),
        dispatcher.clone(),
        config.runner.batch_limit,
    ));
    let interval_secs = config.runner.interval_secs;
    tokio::spawn(async move {
        spawn_runner(runner, interval_secs).await;
    });

    let state = AppState::new(store, dispatcher);
    rally_gateway::server::start(&config.gateway, state).await
}

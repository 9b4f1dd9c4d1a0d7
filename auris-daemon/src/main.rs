//! # aurisd
//!
//! Composition root of the Auris ingest daemon: loads the configuration,
//! opens the embedded store, wires the service graph, and runs the task
//! engine, input watcher, and cleanup sweepers until interrupted.
//!
//! Every collaborator is constructed here and handed down explicitly;
//! there is no global state anywhere in the stack.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auris_config::{ConfigHandle, load_config};
use auris_core::Database;
use auris_core::engine::{Services, TaskEngine, reconcile_archived_pool};
use auris_core::sweep::{ArchiveSweeper, PasswordSweeper};
use auris_core::watcher::InputWatcher;

/// Command line arguments for the Auris ingest daemon
#[derive(Parser, Debug)]
#[command(name = "aurisd")]
#[command(about = "Automated ingest daemon for a personal audio-work library")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Directory holding the embedded database and daemon state
    #[arg(long, env = "DATA_PATH", default_value = "./data")]
    data: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("loading configuration")?;
    let config = ConfigHandle::new(config);

    let db = Database::open(&args.data.join("auris.db"))
        .await
        .context("opening database")?;

    // Reconcile the archived pool against its table before anything new
    // lands in it.
    let pool_dir = config.current().storage.processed_archives_path.clone();
    reconcile_archived_pool(&db, &pool_dir)
        .await
        .context("reconciling archived pool")?;

    let pending = db.conflicts().list_pending().await?;
    if !pending.is_empty() {
        info!(count = pending.len(), "pending conflicts awaiting resolution");
    }

    let services = Services::build(db.clone(), config.clone()).context("wiring services")?;

    let engine = TaskEngine::new(Arc::clone(&services));
    engine.start();

    let watcher = InputWatcher::new(Arc::clone(&engine));
    Arc::clone(&watcher).start().context("starting watcher")?;

    let password_sweeper = PasswordSweeper::new(db.clone(), config.clone());
    password_sweeper.start().context("starting password sweeper")?;

    let archive_sweeper = ArchiveSweeper::new(db.clone(), config.clone());
    archive_sweeper.start().context("starting archive sweeper")?;

    info!("auris daemon running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    watcher.stop();
    password_sweeper.stop();
    archive_sweeper.stop();
    engine.stop();

    Ok(())
}

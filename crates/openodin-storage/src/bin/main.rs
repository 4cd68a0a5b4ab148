//! Development entry point: opens a [`StorageEngine`] against a config
//! file (or defaults), starts the trigger sweep, and idles until
//! interrupted. Real transports (the wire parser, session/connection
//! management) are explicitly out of scope (§1 Non-goals) — this binary
//! exists to prove the engine boots and to exercise it by hand.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use openodin_core::{EngineConfig, SystemClock};
use openodin_storage::StorageEngine;

#[derive(Parser, Debug)]
#[command(name = "openodin-engine", about = "OpenOdin storage engine (development binary)")]
struct Args {
    /// Path to a TOML config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let engine = StorageEngine::open(config, Arc::new(SystemClock))?;
    let sweep = engine.spawn_sweep();
    let gc = engine.spawn_expired_node_gc();

    tracing::info!("openodin-engine started");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    sweep.abort();
    gc.abort();

    Ok(())
}

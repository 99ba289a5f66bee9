//! Gantry - Main entry point
//!
//! Registers the robots from the configuration file, serves the API and runs
//! until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use gantry_core::RobotConfig;
use gantry_daemon::{config, ApiConfigUpdate, Master};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(about = "Robot orchestration daemon with an HTTPS REST API")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gantry.toml")]
    config: PathBuf,

    /// API host, overrides the configuration file
    #[arg(long)]
    host: Option<String>,

    /// API port, overrides the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Gantry v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;

    let master = Master::new();
    master.api(ApiConfigUpdate::from(config.api));
    let api = master.api(ApiConfigUpdate {
        host: args.host,
        port: args.port,
        ..Default::default()
    });
    info!(host = %api.host, port = api.port, "Configuration loaded");

    for definition in config.robots {
        let name = definition.name.clone().unwrap_or_default();
        master
            .robot(RobotConfig::from(definition))
            .with_context(|| format!("Invalid robot configuration '{}'", name))?;
    }

    master.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, halting robots");

    master.halt();
    master.shutdown().await;

    Ok(())
}

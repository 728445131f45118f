//! Pellematic Daemon - Main entry point
//!
//! Polls the controller, runs entity discovery and serves the REST and
//! WebSocket API.

mod api;
mod config;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use pellematic_core::{count_instances, EntityKind};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "pellematic")]
#[command(about = "Ökofen Pellematic entity discovery and polling daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pellematic.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Fetch once, print discovered entities and exit
    #[arg(long)]
    discover_once: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    init_config: bool,
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

    info!("Pellematic v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        if args.config.exists() {
            anyhow::bail!("{} already exists", args.config.display());
        }
        config::save_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        device = %config.redacted().device.host,
        poll_interval_secs = config.device.poll_interval_secs,
        language = ?config.device.language,
        "Configuration loaded"
    );

    // Create application state
    let state = state::AppState::new(config.clone())?;

    if args.discover_once {
        info!("Running single discovery");
        let snapshot = state.poller.poll_once().await?;
        let result = state.poller.discovery().await;

        println!(
            "Discovered {} entities ({}, {}, suffix {}):",
            result.len(),
            config.device.name,
            snapshot.charset,
            snapshot.suffix
        );
        for kind in [
            EntityKind::Sensor,
            EntityKind::BinarySensor,
            EntityKind::Select,
            EntityKind::Number,
        ] {
            let definitions = result.by_kind(kind);
            if definitions.is_empty() {
                continue;
            }
            println!("  {} ({}):", kind, definitions.len());
            for definition in definitions {
                let state = state
                    .entity(&definition.unique_id)
                    .await
                    .map(|view| serde_json::to_string(&view.state).unwrap_or_default())
                    .unwrap_or_default();
                let unit = definition.unit.as_deref().unwrap_or_default();
                let line = format!(
                    "    - {} [{}] = {} {}",
                    definition.unique_id, definition.name, state, unit
                );
                println!("{}", line.trim_end());
            }
        }
        for climate in &result.climates {
            println!("  climate: {} [{}]", climate.unique_id, climate.name);
        }

        let counts = count_instances(&snapshot.data);
        println!("Components:");
        for (prefix, count) in &counts {
            println!("  {} = {}", prefix, count);
        }
        if counts != config.components {
            info!("Discovered component counts differ from the [components] section");
        }
    } else {
        // Daemon mode - run web server and poller
        server::run(state, &config.daemon.bind, config.daemon.tls.as_ref()).await?;
    }

    Ok(())
}

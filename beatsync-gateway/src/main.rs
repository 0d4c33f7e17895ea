//! BeatSync Gateway - Main entry point
//!
//! Wires configuration, logging, the player client, the trigger dispatcher,
//! the scheduler loop and the HTTP API together, and shuts them down cleanly
//! on Ctrl+C / SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beatsync_common::config::{resolve_config_path, TomlConfig};
use beatsync_common::Granularity;
use beatsync_gateway::output::{HardwareOutput, LogRenderer, Rgb, TriggerDispatcher};
use beatsync_gateway::player::{PlayerClient, WebPlayerClient};
use beatsync_gateway::sync::SchedulerLoop;
use beatsync_gateway::{api, SharedState};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for beatsync-gateway
#[derive(Parser, Debug)]
#[command(name = "beatsync-gateway")]
#[command(about = "Keeps light triggers in sync with a remote media player")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "BEATSYNC_PORT")]
    port: Option<u16>,

    /// Initial trigger granularity: beat, bar, tatum or section (overrides config)
    #[arg(short, long)]
    granularity: Option<Granularity>,

    /// Enable or disable hardware output (overrides config)
    #[arg(long, env = "BEATSYNC_HARDWARE")]
    hardware: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration before logging so the configured level applies
    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = TomlConfig::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(granularity) = args.granularity {
        config.default_granularity = granularity;
    }
    if let Some(enabled) = args.hardware {
        config.hardware.enabled = enabled;
    }

    // Initialize tracing
    let default_filter = format!(
        "beatsync_gateway={level},beatsync_common={level},tower_http=info",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BeatSync Gateway v{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    match &config_path {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        _ => info!("Configuration: built-in defaults"),
    }
    info!(
        poll_interval_ms = config.poll_interval_ms,
        drift_tolerance_ms = config.drift_tolerance_ms,
        granularity = %config.default_granularity,
        hardware = config.hardware.enabled,
        "Scheduler settings"
    );

    if config.player.access_token.is_none() {
        warn!("No player access token configured; polls will be rejected until one is provided");
    }

    let player: Arc<dyn PlayerClient> = Arc::new(
        WebPlayerClient::new(
            config.player.base_url.clone(),
            config.player.access_token.clone(),
            config.request_timeout(),
        )
        .context("Failed to create player client")?,
    );

    let state = Arc::new(SharedState::new(config.default_granularity, config.event_bus_capacity));

    let hardware = if config.hardware.enabled {
        let color = Rgb::parse(&config.hardware.color).context("Invalid hardware color")?;
        info!(color = %color, "Hardware output enabled");
        Some(HardwareOutput {
            renderer: Arc::new(LogRenderer),
            color,
        })
    } else {
        None
    };
    let (dispatcher, dispatcher_task) = TriggerDispatcher::spawn(state.clone(), hardware);

    let shutdown = CancellationToken::new();

    let scheduler = SchedulerLoop::new(
        player,
        state.clone(),
        dispatcher,
        config.poll_interval(),
        config.drift_tolerance(),
    )
    .await;
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    let server_shutdown = shutdown.clone();
    let server_result = api::run(config.port, state, async move {
        shutdown_signal().await;
        server_shutdown.cancel();
    })
    .await;

    // The server can also exit on error; stop the scheduler either way
    shutdown.cancel();
    scheduler_task.await.context("Scheduler task failed")?;
    dispatcher_task.await.context("Dispatcher task failed")?;

    server_result.context("HTTP server error")?;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

//! Anchor Agent Daemon
//!
//! The agent runs on each device, finds the Anchor core on the local
//! network, and reports presence with periodic heartbeats. While the core
//! is unreachable heartbeats are buffered and replayed on reconnect.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anchor_agent::{run_agent, AgentStateMachine, HttpLink, SystemMetrics};
use anchor_common::config::{self, AgentConfig, SHARED_SECRET_ENV};
use anchor_common::discovery::{BeaconRole, DiscoveryBeacon, MemoryBeacon, UdpBeacon};
use anchor_common::SystemClock;

#[derive(Parser)]
#[command(name = "anchor-agent")]
#[command(about = "Anchor agent - reports device presence to the core")]
#[command(version)]
struct Args {
    /// Core base URL, skipping discovery (e.g. http://10.0.0.2:3333)
    #[arg(short, long)]
    server: Option<String>,

    /// Device display name, conventionally "<type> - <user>"
    #[arg(short, long)]
    name: Option<String>,

    /// Activity string reported with heartbeats
    #[arg(long)]
    activity: Option<String>,

    /// Shared secret (overrides config)
    #[arg(long, env = SHARED_SECRET_ENV, hide_env_values = true)]
    secret: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Anchor agent starting...");

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_dir().join("agent.toml"));
    let mut config: AgentConfig = config::load_or_default(&config_path);

    // Apply command-line overrides
    if let Some(server) = args.server {
        config.server_url = Some(server);
    }
    if let Some(name) = args.name {
        config.name = Some(name);
    }
    if let Some(activity) = args.activity {
        config.activity = Some(activity);
    }
    if let Some(secret) = args.secret.filter(|s| !s.is_empty()) {
        config.shared_secret = secret;
    }

    let beacon: Arc<dyn DiscoveryBeacon> = match UdpBeacon::bind(
        &config.discovery_group,
        BeaconRole::Seeker,
    )
    .await
    {
        Ok(beacon) => Arc::new(beacon),
        Err(e) if config.server_url.is_some() => {
            tracing::warn!("Discovery unavailable ({}); using configured server only", e);
            Arc::new(MemoryBeacon::new())
        }
        Err(e) => {
            return Err(e).context("Failed to start discovery and no --server was given");
        }
    };

    let link = HttpLink::new(config.shared_secret.clone(), config.request_timeout)
        .context("Failed to create HTTP client")?;

    tracing::info!("Reporting as {}", config.display_name());
    let machine = AgentStateMachine::new(
        &config,
        link,
        beacon,
        Box::new(SystemMetrics::new()),
        SystemClock::shared(),
    );

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let interval = config.heartbeat_interval;
    let machine = run_agent(machine, interval, cancel, |id| {
        // Re-read the file so command-line overrides are not written back
        let mut persisted: AgentConfig = config::load_or_default(&config_path);
        persisted.device_id = Some(id.to_string());
        match config::save_config(&config_path, &persisted) {
            Ok(()) => tracing::info!("Saved device identity to {:?}", config_path),
            Err(e) => tracing::warn!("Failed to save device identity: {}", e),
        }
    })
    .await;

    tracing::info!(
        "Agent shutdown complete ({} heartbeats still buffered)",
        machine.state().buffer.len()
    );
    Ok(())
}

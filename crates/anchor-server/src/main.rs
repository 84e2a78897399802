//! Anchor Core Daemon
//!
//! The core keeps the device registry, serves the HTTP API and relay
//! WebSocket, and answers discovery queries from agents on the LAN.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anchor_common::config::{self, CoreConfig, SHARED_SECRET_ENV};
use anchor_common::discovery::{BeaconRole, DiscoveryBeacon, UdpBeacon};
use anchor_server::announcer::run_announcer;
use anchor_server::{api, CoreState};

#[derive(Parser)]
#[command(name = "anchor-server")]
#[command(about = "Anchor core daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Shared secret (overrides config)
    #[arg(long, env = SHARED_SECRET_ENV, hide_env_values = true)]
    secret: Option<String>,

    /// Do not answer discovery queries
    #[arg(long)]
    no_discovery: bool,

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
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Anchor core starting...");

    // Load configuration
    let mut config: CoreConfig = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        config::load_or_default(&config::default_config_path())
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(secret) = args.secret.filter(|s| !s.is_empty()) {
        config.shared_secret = secret;
    }
    if config.shared_secret == config::DEFAULT_SHARED_SECRET {
        tracing::warn!(
            "Using the default development secret; set {} in production",
            SHARED_SECRET_ENV
        );
    }

    let bind_addr = config.bind_address.clone();
    let announce_interval = config.announce_interval;
    let discovery_group = config.discovery_group.clone();
    let state = Arc::new(CoreState::new(config));

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

    // Bind first so a taken port fails before anything is advertised
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    if args.no_discovery {
        tracing::info!("Discovery responder disabled");
    } else {
        match UdpBeacon::bind(&discovery_group, BeaconRole::Responder).await {
            Ok(beacon) => {
                let beacon: Arc<dyn DiscoveryBeacon> = Arc::new(beacon);
                tokio::spawn(run_announcer(
                    beacon,
                    state.announcement(),
                    announce_interval,
                    cancel.clone(),
                ));
            }
            Err(e) => {
                tracing::warn!("Discovery unavailable ({}); agents need a fixed server URL", e);
            }
        }
    }

    tracing::info!("Anchor core listening on {}", bind_addr);
    axum::serve(
        listener,
        api::router(Arc::clone(&state)).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancel.clone().cancelled_owned())
    .await
    .context("HTTP server failed")?;

    tracing::info!("Anchor core shutdown complete");
    Ok(())
}

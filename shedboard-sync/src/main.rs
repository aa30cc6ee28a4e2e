//! shedboard-sync - booking mirror driver
//!
//! Loads configuration, then either prints one snapshot of the booking
//! cache as JSON or keeps the cache warm on an interval until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shedboard_common::config::{resolve_config_path, ShedboardConfig};
use shedboard_sync::{CacheOrchestrator, CachedView, SyncSettings};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for shedboard-sync
#[derive(Parser, Debug)]
#[command(name = "shedboard-sync")]
#[command(about = "Mirror a rowing club's boat bookings into a local cache")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to $SHEDBOARD_CONFIG, then ~/.config/shedboard/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore any cached data and refresh immediately
    #[arg(short, long)]
    force: bool,

    /// Keep refreshing every SECS seconds instead of printing one snapshot
    #[arg(short, long, value_name = "SECS")]
    watch: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())?;
    let mut config = ShedboardConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.apply_env_overrides();

    // Initialize tracing
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("shedboard_sync={level},shedboard_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting shedboard-sync {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    let settings = SyncSettings::from_config(&config).context("Invalid configuration")?;
    info!(
        upstream = %settings.base_url,
        ttl_secs = settings.cache_ttl.as_secs(),
        batch_size = settings.batch_size,
        window_days = settings.window_days,
        "Pipeline configured"
    );

    let orchestrator = CacheOrchestrator::new(&settings);

    match args.watch {
        None => {
            let view = orchestrator
                .get(args.force)
                .await
                .context("Refresh failed and no cached data is available")?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Some(secs) => watch(&orchestrator, Duration::from_secs(secs.max(1)), args.force).await,
    }

    info!("Shutdown complete");
    Ok(())
}

/// Refresh on an interval until Ctrl+C or SIGTERM
async fn watch(orchestrator: &CacheOrchestrator, every: Duration, force_first: bool) {
    let mut ticker = tokio::time::interval(every);
    let mut force = force_first;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match orchestrator.get(force).await {
                    Ok(view) => log_view(&view),
                    Err(e) => error!(error = %e, "Refresh failed and nothing is cached"),
                }
                force = false;
            }
        }
    }
}

fn log_view(view: &CachedView) {
    let metadata = &view.entry.metadata;
    if view.stale {
        warn!(
            reason = view.stale_reason.as_deref().unwrap_or("expired"),
            cycle_at = %metadata.cycle_at,
            "Serving stale bookings"
        );
    } else {
        info!(
            assets = metadata.asset_count,
            bookings = metadata.booking_count,
            failed_assets = metadata.failed_asset_count,
            expires_at = %view.entry.expires_at,
            "Bookings current"
        );
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}

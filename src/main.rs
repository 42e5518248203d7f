//! netmonitor - Entry point.
//!
//! Captures IPv4 traffic on the selected interface, flags packets bound for
//! blacklisted addresses, and keeps the blacklist growing from a remote
//! hosts feed in the background.

use std::borrow::Cow;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use netmonitor::cache::BlacklistCache;
use netmonitor::config::Config;
use netmonitor::network::{LoggingListener, PacketCaptureEngine, PnetBackend};
use netmonitor::resolver::HickoryResolver;
use netmonitor::store::{BlacklistStore, MemoryStore, SqliteStore};
use netmonitor::sync::{BlacklistSynchronizer, SyncStateStore};

/// Create a token cancelled on SIGINT or SIGTERM.
fn create_shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, shutting down...");
        token_clone.cancel();
    });

    token
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Spawn the synchronizer over `store`, or just load the stored blacklist
/// when sync is disabled.
async fn start_blacklist<S: BlacklistStore>(
    config: &Config,
    store: S,
    cache: BlacklistCache,
    shutdown: CancellationToken,
) -> Result<Option<JoinHandle<()>>> {
    if !config.sync.enabled {
        let entries = store
            .load_all()
            .await
            .context("Failed to load blacklist")?;
        cache.replace(entries);
        info!("Blacklist sync disabled, loaded {} stored entries", cache.len());
        return Ok(None);
    }

    let resolver = HickoryResolver::new(config.sync.dns_timeout());
    let state = SyncStateStore::new(config.sync.state_file());
    info!("Sync state file: {}", state.path().display());

    let synchronizer = BlacklistSynchronizer::new(&config.sync, store, resolver, cache, state)
        .context("Failed to create blacklist synchronizer")?;

    Ok(Some(tokio::spawn(async move {
        synchronizer.run(shutdown).await;
    })))
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config =
        Config::load_or_default(config_path.as_ref()).context("Failed to load configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    netmonitor::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting netmonitor...");
    info!("Blacklist feed: {}", config.sync.feed_url);

    let shutdown = create_shutdown_token();
    let cache = BlacklistCache::new();

    let sync_handle = if let Some(path) = &config.database_path {
        info!("Blacklist database: {}", path.display());
        let store = SqliteStore::open(path).context("Failed to open blacklist database")?;
        start_blacklist(&config, store, cache.clone(), shutdown.clone()).await?
    } else {
        warn!("No database_path configured, blacklist is kept in memory only");
        start_blacklist(&config, MemoryStore::new(), cache.clone(), shutdown.clone()).await?
    };

    let engine = PacketCaptureEngine::new(
        PnetBackend,
        cache,
        config.capture.clone(),
        config.interface.clone(),
    );
    engine.set_listener(LoggingListener);

    match engine.start() {
        Ok(()) => info!("Packet capture running"),
        Err(err) if sync_handle.is_some() => {
            error!("Packet capture unavailable, continuing with blacklist sync only: {err}");
        }
        Err(err) => return Err(err).context("Failed to start packet capture"),
    }

    shutdown.cancelled().await;

    engine.stop();
    if let Some(handle) = sync_handle
        && let Err(err) = handle.await
    {
        error!("Blacklist sync task failed: {err}");
    }

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    run().await
}

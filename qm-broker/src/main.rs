//! Configuration Broker (qm-broker) - Main entry point
//!
//! Long-running context owning the tiered remote-configuration cache.
//! Other contexts reach it through the message protocol served over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use qm_broker::broker::ConfigBroker;
use qm_broker::cache::TieredConfigCache;
use qm_broker::fetch::HttpConfigFetcher;
use qm_broker::{config, server};
use qm_common::db::KvStore;
use qm_common::events::EventBus;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for qm-broker
#[derive(Parser, Debug)]
#[command(name = "qm-broker")]
#[command(about = "Configuration broker for Quiet Mode")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5760", env = "QM_BROKER_PORT")]
    port: u16,

    /// Data folder holding the key/value store
    #[arg(short, long, env = "QM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Remote configuration document URL
    #[arg(long, env = "QM_CONFIG_URL")]
    config_url: Option<String>,

    /// Force a refresh on startup (install/update path)
    #[arg(long)]
    force_refresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qm_broker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_ref())
        .context("Failed to resolve root folder")?;
    let config_url =
        config::resolve_config_url(args.config_url).context("Failed to resolve config URL")?;

    info!("Root folder: {}", root_folder.display());
    info!("Config URL: {}", config_url);

    let bus = EventBus::new();
    let store = KvStore::open(&root_folder.join("qm.db"), bus.clone())
        .await
        .context("Failed to open key/value store")?;

    let fetcher = HttpConfigFetcher::new(config_url).context("Failed to build HTTP client")?;
    let cache = TieredConfigCache::new(store, fetcher);
    let broker = ConfigBroker::new(cache).spawn(&bus);

    if args.force_refresh {
        info!("Forcing config refresh on startup");
        let _ = broker.refresh_config().await;
    }

    server::run(args.port, broker)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

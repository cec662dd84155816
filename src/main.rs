//! ircbnc - multi-user, multi-network IRC bouncer.
//!
//! Keeps upstream IRC sessions alive on behalf of intermittently connected
//! clients, which manage them in-band with `BOUNCER` commands.

mod config;
mod db;
mod error;
mod handlers;
mod hooks;
mod http;
mod metrics;
mod network;
mod state;
mod telemetry;
mod upstream;

use crate::config::Config;
use crate::db::{MemoryNetworkStore, NetworkStore, RedbNetworkStore};
use crate::network::Gateway;
use crate::state::{Bouncer, User};
use crate::upstream::Connector;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// `database.path` value selecting the non-persistent store.
const MEMORY_DB: &str = ":memory:";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ircbnc.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        users = config.users.len(),
        "Starting ircbnc"
    );

    metrics::init();

    let store: Arc<dyn NetworkStore> = if config.database.path == MEMORY_DB {
        info!("Using in-memory network store; networks will not survive a restart");
        Arc::new(MemoryNetworkStore::new())
    } else {
        info!(path = %config.database.path, "Opening network store");
        Arc::new(RedbNetworkStore::open(&config.database.path)?)
    };

    let connector = Arc::new(Connector::new(&config.upstream));
    let bouncer = Arc::new(Bouncer::new(config.server.name.clone(), store, connector));
    for block in &config.users {
        bouncer.add_user(User::from_block(block));
    }
    let loaded = bouncer.load_networks()?;
    info!(networks = loaded, "Restored stored networks");

    // Prometheus metrics are optional.
    if let Some(metrics_config) = &config.metrics {
        let port = metrics_config.port;
        tokio::spawn(async move {
            http::run_http_server(port).await;
        });
    } else {
        info!("Metrics endpoint disabled");
    }

    let gateway = Gateway::bind(config.listen.address, Arc::clone(&bouncer)).await?;

    tokio::select! {
        _ = gateway.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        }
    }

    bouncer.shutdown();
    info!("ircbnc stopped");
    Ok(())
}

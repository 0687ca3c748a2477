//! Supervised backend + UI

use std::sync::Arc;

use tokio::sync::watch;

use crate::cache::{CacheStorage, CachedEsi};
use crate::client::EsiClient;
use crate::config::Config;
use crate::error::Result;
use crate::scanner::{self, MarketTypeSource, ScanBudget};
use crate::supervisor::Supervisor;

/// Run the backend and UI under supervision until interrupted.
///
/// A background sweep warms the market cache while the services run; it
/// shares the supervisor's shutdown signal.
pub async fn run(override_path: Option<&str>) -> Result<()> {
    let config = super::load_config(override_path)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, shutting down");
            let _ = tx.send(true);
        }
    });

    let warmer = match start_cache_warmer(&config, shutdown_rx.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Cache warmer not started: {}", e);
            None
        }
    };

    let mut supervisor = Supervisor::new(config.supervisor.clone())?;
    let result = supervisor.run(shutdown_rx).await;

    if let Some(handle) = warmer {
        let _ = shutdown_tx.send(true);
        let _ = handle.await;
    }

    result
}

/// Kick off one detached sweep of the configured region
fn start_cache_warmer(
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let client = EsiClient::new(
        &config.esi.base_url,
        &config.esi.user_agent,
        config.scan.request_timeout(),
    )?;
    let storage = CacheStorage::open()?;
    let cached = Arc::new(CachedEsi::new(client, storage));

    let source = MarketTypeSource::new(cached.clone(), config.esi.region_id, config.cache_ttl());
    let budget = ScanBudget::from(&config.scan);
    let fetch = super::scan::order_fetcher(config.esi.region_id, config.cache_ttl(), cached);

    Ok(scanner::spawn_background(budget, source, fetch, shutdown))
}

//! Foreground market sweep

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStorage, CachedEsi};
use crate::client::{EsiApi, EsiClient};
use crate::error::Result;
use crate::scanner::{MarketTypeSource, ScanBudget, run_bounded_scan};

/// Run one budget-bounded sweep of the configured region and print the tally
pub async fn run(override_path: Option<&str>) -> Result<()> {
    let config = super::load_config(override_path)?;

    let client = EsiClient::new(
        &config.esi.base_url,
        &config.esi.user_agent,
        config.scan.request_timeout(),
    )?;
    let storage = CacheStorage::open()?;
    let cached = Arc::new(CachedEsi::new(client, storage));

    let budget = ScanBudget::from(&config.scan);
    let ttl = config.cache_ttl();
    let region_id = config.esi.region_id;
    let mut source = MarketTypeSource::new(cached.clone(), region_id, ttl);

    log::info!("Starting market sweep for region {}", region_id);
    let tally = run_bounded_scan(&budget, &mut source, order_fetcher(region_id, ttl, cached)).await?;

    println!("Sweep complete: {}", tally);
    Ok(())
}

/// Per-item fetch closure: refresh one type's order book through the cache.
///
/// Takes the region and TTL by value so the closure owns everything it
/// captures and can be handed to a detached task.
pub(super) fn order_fetcher<C: EsiApi + 'static>(
    region_id: i64,
    ttl: Duration,
    cached: Arc<CachedEsi<C>>,
) -> impl Fn(i64) -> std::pin::Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    move |type_id: i64| {
        let cached = cached.clone();
        Box::pin(fetch_orders(cached, region_id, type_id, ttl))
    }
}

async fn fetch_orders<C: EsiApi>(
    cached: Arc<CachedEsi<C>>,
    region_id: i64,
    type_id: i64,
    ttl: Duration,
) -> Result<()> {
    let path = format!("/markets/{}/orders/", region_id);
    let params = vec![("type_id".to_string(), type_id.to_string())];
    cached.fetch_with_cache(&path, &params, ttl, None).await?;
    Ok(())
}

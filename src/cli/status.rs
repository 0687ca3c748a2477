//! Status command implementation

use crate::auth::TokenStore;
use crate::cache::CacheStorage;
use crate::error::Result;

/// Show configuration, character and cache status
pub fn run(override_path: Option<&str>) -> Result<()> {
    println!("evetrack status");
    println!("----------------------------------------");

    let path = super::config_path(override_path)?;
    let config = match super::load_config(override_path) {
        Ok(config) => config,
        Err(_) => {
            println!("Configuration not found at {}", path.display());
            println!("Run 'evetrack init' to create one.");
            return Ok(());
        }
    };

    println!("Config file:    {}", path.display());
    println!("ESI base:       {}", config.esi.base_url);
    println!("Region:         {}", config.esi.region_id);
    if config.validate_credentials().is_ok() {
        println!("SSO app:        configured");
    } else {
        println!("SSO app:        not configured (set esi.client_id / esi.client_secret)");
    }

    let store = TokenStore::open()?;
    let ids = store.character_ids()?;
    if ids.is_empty() {
        println!("Characters:     none registered");
    } else {
        println!("Characters:     {}", ids.len());
    }

    let storage = CacheStorage::open()?;
    let stats = storage.stats(config.cache_ttl())?;
    println!(
        "Cache entries:  {} ({} fresh, {} stale)",
        stats.total_entries, stats.fresh_entries, stats.stale_entries
    );
    println!("Cache size:     {}", format_size(stats.total_size_bytes));

    Ok(())
}

/// Format bytes as human-readable size
pub(super) fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

//! Cache management commands

use crate::cache::CacheStorage;
use crate::error::Result;

/// Show cache statistics
pub fn status(override_path: Option<&str>) -> Result<()> {
    // stats need the TTL to split fresh from stale; fall back to defaults
    // when no config exists yet
    let config = super::load_config(override_path).unwrap_or_default();

    let storage = CacheStorage::open()?;
    let stats = storage.stats(config.cache_ttl())?;

    println!("Cache Status");
    println!("----------------------------------------");
    println!("Location:       {}", CacheStorage::data_dir()?.display());
    println!("Fresh entries:  {}", stats.fresh_entries);
    println!("Stale entries:  {}", stats.stale_entries);
    println!(
        "Total size:     {}",
        super::status::format_size(stats.total_size_bytes)
    );

    Ok(())
}

/// Clear all cache entries
pub fn clear() -> Result<()> {
    let storage = CacheStorage::open()?;
    let removed = storage.clear_all()?;

    if removed > 0 {
        println!("Cleared {} cache entries", removed);
    } else {
        println!("Cache was already empty");
    }

    Ok(())
}

/// Show the data directory path
pub fn path() -> Result<()> {
    println!("{}", CacheStorage::data_dir()?.display());
    Ok(())
}

//! Configuration management for evetrack

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Application configuration, loaded from `~/.evetrack/config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ESI and SSO endpoints and credentials
    #[serde(default)]
    pub esi: EsiConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Bounded market scan budget
    #[serde(default)]
    pub scan: ScanConfig,

    /// Backend/UI process supervision
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// ESI endpoints and OAuth application credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiConfig {
    #[serde(default = "default_esi_base")]
    pub base_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// SSO application client ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// SSO application client secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Market region swept by the scanner (default: The Forge)
    #[serde(default = "default_region_id")]
    pub region_id: i64,
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window in seconds before a cached response is revalidated
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

/// Budget for one bounded scan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Maximum number of items fetched in one run
    #[serde(default = "default_item_cap")]
    pub item_cap: usize,

    /// Wall-clock budget for one run, in seconds
    #[serde(default = "default_time_budget")]
    pub time_budget_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Throttling pause between batches, in seconds
    #[serde(default = "default_inter_batch_pause")]
    pub inter_batch_pause_secs: u64,

    /// Per-request timeout, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Supervised process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Backend command line (program + args)
    #[serde(default)]
    pub backend_command: Vec<String>,

    /// UI command line (program + args)
    #[serde(default)]
    pub ui_command: Vec<String>,

    /// Backend readiness probe URL
    #[serde(default = "default_health_url")]
    pub health_url: String,

    #[serde(default = "default_health_poll_timeout")]
    pub health_poll_timeout_secs: u64,

    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_secs: u64,

    /// Liveness check interval for the monitoring loop
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Base restart backoff; scaled by recent restart count
    #[serde(default = "default_restart_backoff")]
    pub restart_backoff_secs: u64,
}

fn default_esi_base() -> String {
    "https://esi.evetech.net/latest".to_string()
}

fn default_token_url() -> String {
    "https://login.eveonline.com/v2/oauth/token".to_string()
}

fn default_user_agent() -> String {
    format!("evetrack/{}", env!("CARGO_PKG_VERSION"))
}

fn default_region_id() -> i64 {
    10000002 // The Forge
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_worker_count() -> usize {
    4
}

fn default_item_cap() -> usize {
    500
}

fn default_time_budget() -> u64 {
    120
}

fn default_batch_size() -> usize {
    20
}

fn default_inter_batch_pause() -> u64 {
    1
}

fn default_request_timeout() -> u64 {
    15
}

fn default_health_url() -> String {
    "http://127.0.0.1:5000/health".to_string()
}

fn default_health_poll_timeout() -> u64 {
    45
}

fn default_health_poll_interval() -> u64 {
    1
}

fn default_monitor_interval() -> u64 {
    2
}

fn default_restart_backoff() -> u64 {
    2
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            base_url: default_esi_base(),
            token_url: default_token_url(),
            user_agent: default_user_agent(),
            client_id: None,
            client_secret: None,
            region_id: default_region_id(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            item_cap: default_item_cap(),
            time_budget_secs: default_time_budget(),
            batch_size: default_batch_size(),
            inter_batch_pause_secs: default_inter_batch_pause(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backend_command: Vec::new(),
            ui_command: Vec::new(),
            health_url: default_health_url(),
            health_poll_timeout_secs: default_health_poll_timeout(),
            health_poll_interval_secs: default_health_poll_interval(),
            monitor_interval_secs: default_monitor_interval(),
            restart_backoff_secs: default_restart_backoff(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            esi: EsiConfig::default(),
            cache: CacheConfig::default(),
            scan: ScanConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".evetrack").join("config.yaml"))
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // Config holds the SSO client secret; keep it private
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Validate that SSO application credentials are present
    pub fn validate_credentials(&self) -> Result<()> {
        if self.esi.client_id.is_none() || self.esi.client_secret.is_none() {
            return Err(ConfigError::MissingCredentials.into());
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

impl ScanConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn inter_batch_pause(&self) -> Duration {
        Duration::from_secs(self.inter_batch_pause_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SupervisorConfig {
    pub fn health_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.health_poll_timeout_secs)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff_secs)
    }
}

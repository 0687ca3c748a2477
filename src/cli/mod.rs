//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod auth;
pub mod cache;
pub mod init;
pub mod scan;
pub mod serve;
pub mod status;

use crate::config::Config;
use crate::error::Result;

/// evetrack - EVE Online industry tracking companion
#[derive(Parser, Debug)]
#[command(name = "evetrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Override config file location
    #[arg(long, global = true, env = "EVETRACK_CONFIG", hide_env = true)]
    pub config: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file
    Init,

    /// Run the backend and UI under supervision
    Serve,

    /// Run one bounded market sweep and print the tally
    Scan,

    /// Show configuration, character and cache status
    Status,

    /// Display version information
    Version,

    /// Manage character authentication
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Manage the local response cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Character authentication subcommands
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Register a character's refresh token
    Add {
        /// Character ID
        character_id: i64,

        /// Character name
        #[arg(long)]
        name: String,

        /// Refresh token from the SSO authorization flow
        #[arg(long)]
        refresh_token: String,

        /// Granted scopes, comma-separated or repeated
        #[arg(long, value_delimiter = ',')]
        scopes: Vec<String>,
    },

    /// Force a token refresh to verify SSO credentials
    Refresh {
        /// Character ID
        character_id: i64,
    },

    /// List registered characters and their token state
    List,
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,
    /// Clear all cached data
    Clear,
    /// Print data directory path
    Path,
}

/// Resolve the config file path, honoring the --config override
pub fn config_path(override_path: Option<&str>) -> Result<PathBuf> {
    match override_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Config::default_path(),
    }
}

/// Load the configuration for a command
pub fn load_config(override_path: Option<&str>) -> Result<Config> {
    Config::load_from(config_path(override_path)?)
}

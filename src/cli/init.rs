//! Configuration bootstrap

use crate::config::Config;
use crate::error::{ConfigError, Result};

/// Write a default configuration file at the resolved path
pub fn run(override_path: Option<&str>) -> Result<()> {
    let path = super::config_path(override_path)?;

    if path.exists() {
        return Err(ConfigError::Invalid(format!(
            "{} already exists; edit it instead",
            path.display()
        ))
        .into());
    }

    Config::default().save_to(path.clone())?;

    println!("Wrote default configuration to {}", path.display());
    println!("Set esi.client_id and esi.client_secret before using 'evetrack auth'.");
    println!("Set supervisor.backend_command and supervisor.ui_command before 'evetrack serve'.");
    Ok(())
}

//! Character authentication commands

use chrono::Utc;

use crate::auth::{SsoClient, TokenManager, TokenRecord, TokenState, TokenStore};
use crate::error::{ConfigError, Result};

/// Register a character's refresh token.
///
/// The access token starts empty; the first authenticated call (or
/// `auth refresh`) exchanges the refresh token for one.
pub fn add(
    override_path: Option<&str>,
    character_id: i64,
    name: &str,
    refresh_token: &str,
    scopes: Vec<String>,
) -> Result<()> {
    // fail early when the SSO app is not configured
    super::load_config(override_path)?.validate_credentials()?;

    let store = TokenStore::open()?;
    let record = TokenRecord {
        character_id,
        character_name: name.to_string(),
        access_token: String::new(),
        refresh_token: refresh_token.to_string(),
        expires_at: Utc::now(),
        scopes,
        revoked: false,
    };
    store.upsert(&record)?;

    println!("Registered {} ({})", name, character_id);
    println!("Run 'evetrack auth refresh {}' to verify.", character_id);
    Ok(())
}

/// Force a token refresh to verify the SSO setup end to end
pub async fn refresh(override_path: Option<&str>, character_id: i64) -> Result<()> {
    let config = super::load_config(override_path)?;
    config.validate_credentials()?;

    let sso = SsoClient::new(
        &config.esi.token_url,
        config
            .esi
            .client_id
            .as_deref()
            .ok_or(ConfigError::MissingCredentials)?,
        config
            .esi
            .client_secret
            .as_deref()
            .ok_or(ConfigError::MissingCredentials)?,
    )?;

    let manager = TokenManager::new(sso, TokenStore::open()?);
    manager.get_valid_access_token(character_id).await?;

    println!("Token refresh succeeded for character {}", character_id);
    Ok(())
}

/// List registered characters with their token state
pub fn list() -> Result<()> {
    let store = TokenStore::open()?;
    let ids = store.character_ids()?;

    if ids.is_empty() {
        println!("No characters registered. Run 'evetrack auth add' first.");
        return Ok(());
    }

    let now = Utc::now();
    let margin = chrono::Duration::seconds(60);
    for id in ids {
        if let Some(record) = store.get(id)? {
            let state = match record.state(now, margin) {
                TokenState::Authenticated => "authenticated",
                TokenState::Expired => "expired (refreshes on next use)",
                TokenState::Unauthenticated => "registered, never refreshed",
                TokenState::Revoked => "revoked - re-authentication required",
            };
            println!("{:>12}  {}  {}", id, record.character_name, state);
        }
    }
    Ok(())
}

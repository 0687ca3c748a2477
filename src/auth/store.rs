//! SQLite-backed token record storage
//!
//! One row per character. Durable across restarts so a registered character
//! never has to re-run the browser OAuth flow as long as its refresh token
//! stays valid.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::error::CacheError;

const SCHEMA_VERSION: i32 = 1;

type Result<T> = std::result::Result<T, CacheError>;

/// Lifecycle state of a character's tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    Authenticated,
    Expired,
    /// Refresh token rejected by the SSO; re-authentication required.
    /// Terminal until the character re-registers.
    Revoked,
}

/// Persisted OAuth state for one character
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub character_id: i64,
    pub character_name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub revoked: bool,
}

impl TokenRecord {
    /// Current lifecycle state, judged against `now` with a safety margin
    pub fn state(&self, now: DateTime<Utc>, margin: chrono::Duration) -> TokenState {
        if self.revoked {
            TokenState::Revoked
        } else if self.access_token.is_empty() {
            TokenState::Unauthenticated
        } else if self.expires_at - margin <= now {
            TokenState::Expired
        } else {
            TokenState::Authenticated
        }
    }
}

/// SQLite-backed token record store
pub struct TokenStore {
    conn: Connection,
}

impl TokenStore {
    /// Open or create the token store at the default location (~/.evetrack)
    pub fn open() -> Result<Self> {
        let home = dirs::home_dir().ok_or(CacheError::NoHome)?;
        Self::open_at(&home.join(".evetrack"))
    }

    /// Open the token store at a specific directory (for testing)
    pub fn open_at(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| CacheError::Io(format!("Failed to create data dir: {}", e)))?;

        let db_path: PathBuf = dir.join("tokens.db");
        let conn = Connection::open(&db_path)?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Token store schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove token DB: {}", e)))?;
            return Self::open_at(dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS token_records (
                character_id INTEGER PRIMARY KEY NOT NULL,
                character_name TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                scopes TEXT NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn })
    }

    /// Get the token record for a character
    pub fn get(&self, character_id: i64) -> Result<Option<TokenRecord>> {
        let row: Option<(String, String, String, i64, String, bool)> = self
            .conn
            .query_row(
                "SELECT character_name, access_token, refresh_token, expires_at, scopes, revoked
                 FROM token_records WHERE character_id = ?1",
                [character_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(character_name, access_token, refresh_token, expires_at, scopes, revoked)| {
                TokenRecord {
                    character_id,
                    character_name,
                    access_token,
                    refresh_token,
                    expires_at: DateTime::from_timestamp(expires_at, 0).unwrap_or_else(Utc::now),
                    scopes: scopes.split(' ').map(|s| s.to_string()).collect(),
                    revoked,
                }
            },
        ))
    }

    /// Upsert a token record
    pub fn upsert(&self, record: &TokenRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO token_records
             (character_id, character_name, access_token, refresh_token, expires_at, scopes, revoked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.character_id,
                record.character_name,
                record.access_token,
                record.refresh_token,
                record.expires_at.timestamp(),
                record.scopes.join(" "),
                record.revoked,
            ],
        )?;
        Ok(())
    }

    /// Mark a character's tokens as revoked
    pub fn mark_revoked(&self, character_id: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE token_records SET revoked = 1 WHERE character_id = ?1",
            [character_id],
        )?;
        Ok(updated > 0)
    }

    /// List all registered character IDs
    pub fn character_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT character_id FROM token_records ORDER BY character_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

//! String-keyed local storage handed to components that cache data.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// Minimal get/put store for cached strings such as the playlist JSON.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    async fn put_string(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or opened.
    pub async fn new() -> Result<Self> {
        Self::open(&crate::paths::store_db_path()).await
    }

    /// Open a store at a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!("Opening key-value store at {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Last time `key` was written, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let key = key.to_string();
        let seconds = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("SELECT updated_at FROM kv WHERE key = ?1")?;
                let seconds = stmt
                    .query_row(rusqlite::params![key], |row| row.get::<_, i64>(0))
                    .optional()?;
                Ok(seconds)
            })
            .await?;

        Ok(seconds.and_then(|s| DateTime::from_timestamp(s, 0)))
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        debug!("Store lookup: {}", key);
        let key = key.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
                let value = stmt
                    .query_row(rusqlite::params![key], |row| row.get::<_, String>(0))
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(Into::into)
    }

    async fn put_string(&self, key: &str, value: &str) -> Result<()> {
        debug!("Store write: {} ({} bytes)", key, value.len());
        let key = key.to_string();
        let value = value.to_string();
        let now = Utc::now().timestamp();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r"
                    INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                    ",
                    rusqlite::params![key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

/// In-process store, used when persistence is disabled and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

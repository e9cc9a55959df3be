//! Key-value persistence.
//!
//! Values are JSON documents stored under well-known keys. The SQLite
//! implementation upserts into `kv_store`; the in-memory one backs tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::OptionalExtension;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use clickflow_core::error::ClickflowError;

use crate::db::Database;

/// Well-known keys.
pub mod keys {
    pub const SCENARIOS: &str = "scenarios";
    pub const SCENARIO_COUNTER: &str = "scenario_counter";
    pub const TELEGRAM_SETTINGS: &str = "telegram_settings";
    pub const INCOMING_MESSAGES: &str = "incoming_messages";
}

/// String-valued durable storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ClickflowError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ClickflowError>;
    fn remove(&self, key: &str) -> Result<(), ClickflowError>;
}

/// Read and deserialize a JSON value. Missing keys yield `None`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, ClickflowError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize a value as JSON and store it.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), ClickflowError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// [`KeyValueStore`] on the `kv_store` SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    db: Arc<Database>,
}

impl SqliteKvStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClickflowError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ClickflowError::Storage(format!("Failed to read key {}: {}", key, e)))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClickflowError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value],
            )
            .map_err(|e| ClickflowError::Storage(format!("Failed to write key {}: {}", key, e)))?;
            debug!(key, bytes = value.len(), "kv write");
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), ClickflowError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])
                .map_err(|e| {
                    ClickflowError::Storage(format!("Failed to delete key {}: {}", key, e))
                })?;
            Ok(())
        })
    }
}

/// Volatile [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ClickflowError> {
        self.entries
            .lock()
            .map_err(|e| ClickflowError::Storage(format!("Lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClickflowError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClickflowError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClickflowError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

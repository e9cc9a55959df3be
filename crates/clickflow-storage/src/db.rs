//! SQLite file backing the key-value store.
//!
//! Clickflow keeps scenarios, Telegram settings and message history as JSON
//! documents in one `kv_store` table. This module owns the connection to
//! that file; [`crate::kv::SqliteKvStore`] is the only caller.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use clickflow_core::error::ClickflowError;

use crate::migrations;

/// The `clickflow.db` connection. Every key-value read and write goes
/// through [`Database::with_conn`], one at a time.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the store file, creating parent directories, and
    /// bring the `kv_store` schema up to date.
    pub fn new(path: &Path) -> Result<Self, ClickflowError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ClickflowError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| ClickflowError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Migrated in-memory store for tests.
    pub fn in_memory() -> Result<Self, ClickflowError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ClickflowError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ClickflowError>
    where
        F: FnOnce(&Connection) -> Result<T, ClickflowError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ClickflowError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

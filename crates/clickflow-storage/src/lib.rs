//! Clickflow Storage crate - SQLite-backed key-value persistence.
//!
//! Provides a WAL-mode SQLite database with migrations and a small
//! JSON key-value layer used for scenarios, the id counter, Telegram
//! settings and message history.

pub mod db;
pub mod kv;
pub mod migrations;

pub use db::Database;
pub use kv::{keys, load_json, save_json, KeyValueStore, MemoryKvStore, SqliteKvStore};

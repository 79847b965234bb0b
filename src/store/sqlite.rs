//! SQLite-backed local store.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use super::{LocalStore, StoreError};

/// The local store backed by a single SQLite table.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(db_path)?;

        // WAL mode for concurrent reads
        db.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(db)
    }

    /// A throwaway in-memory database.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS local_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;

        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.conn();
        let value = db
            .query_row(
                "SELECT value FROM local_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let db = self.conn();
        db.execute(
            "INSERT INTO local_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let db = self.conn();
        let rows = db.execute("DELETE FROM local_store WHERE key = ?1", params![key])?;
        if rows > 0 {
            tracing::debug!(key = key, "Store slot removed");
        }
        Ok(())
    }
}

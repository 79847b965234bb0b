//! Local key-value store for saved key values.
//!
//! The registry only needs `get`/`set`/`remove`. Every slot is written
//! under a namespaced key so unrelated data in the same store never
//! collides with ours.

pub mod sqlite;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub use sqlite::SqliteStore;

/// Default prefix for namespaced store keys.
pub const DEFAULT_NAMESPACE: &str = "keydeck.apikey.";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage quota exceeded ({limit} slots)")]
    QuotaExceeded { limit: usize },
}

/// Persistent key-value capability.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Build the store key for an identifier.
pub fn namespaced_key(namespace: &str, identifier: &str) -> String {
    format!("{}{}", namespace, identifier)
}

// ── In-memory store ─────────────────────────────────────────────────

/// Mutex-guarded map. Optionally caps the number of slots to model a
/// quota-limited store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
    limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses new slots once `limit` are in use.
    pub fn with_limit(limit: usize) -> Self {
        Self { slots: Mutex::new(HashMap::new()), limit: Some(limit) }
    }

    /// Copy of every slot (for inspection).
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = self.limit {
            if !slots.contains_key(key) && slots.len() >= limit {
                return Err(StoreError::QuotaExceeded { limit });
            }
        }
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key);
        Ok(())
    }
}

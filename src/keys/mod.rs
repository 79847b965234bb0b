//! Key registry: the API key lifecycle for the settings panel.
//!
//! Owns one [`KeyEntry`] per known identifier and mediates between the
//! local store (persisted values) and the backend (required/configured
//! flags, key tests). The presentation layer only ever calls the
//! methods here.
//!
//! Validity per entry:
//!
//! ```text
//!   Unknown --test ok--------------> Valid
//!   Unknown --test failed/unreached-> Invalid
//!   Valid | Invalid --edit/reload--> Unknown
//! ```
//!
//! All methods take `&self`. Locks are held only for short synchronous
//! sections, never across an `.await`, so tests of different keys run
//! concurrently.

pub mod catalog;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::backend::{KeyValidator, StatusProvider, TestKeyRequest};
use crate::error::RegistryError;
use crate::store::{namespaced_key, LocalStore, DEFAULT_NAMESPACE};

/// Shown in place of a hidden, non-empty value.
const MASK: &str = "********";

// ── Types ───────────────────────────────────────────────────────────

/// Result of the most recent key test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

/// One API key slot.
///
/// `Debug` never prints the secret, and serialized snapshots carry it
/// only while the entry is visible.
#[derive(Clone)]
pub struct KeyEntry {
    pub identifier: String,
    /// Current text, possibly unsaved. Empty means "not set".
    pub value: String,
    pub validity: Validity,
    /// The application treats this key as mandatory.
    pub required: bool,
    /// The backend already holds its own value for this key.
    pub configured: bool,
    /// Reveal the value in clear text.
    pub visible: bool,
    /// Bumped whenever the value is replaced by an edit or a load.
    generation: u64,
}

impl KeyEntry {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            value: String::new(),
            validity: Validity::Unknown,
            required: false,
            configured: false,
            visible: false,
            generation: 0,
        }
    }

    /// Whether the value holds anything besides whitespace.
    pub fn has_value(&self) -> bool {
        !self.value.trim().is_empty()
    }

    /// Label for the panel; unknown identifiers show as themselves.
    pub fn display_name(&self) -> &str {
        catalog::get_key(&self.identifier)
            .map_or(self.identifier.as_str(), |spec| spec.display_name)
    }

    /// The value as the presentation layer should render it.
    pub fn display_value(&self) -> &str {
        if self.visible || self.value.is_empty() {
            &self.value
        } else {
            MASK
        }
    }
}

impl Drop for KeyEntry {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("identifier", &self.identifier)
            .field("has_value", &self.has_value())
            .field("validity", &self.validity)
            .field("required", &self.required)
            .field("configured", &self.configured)
            .field("visible", &self.visible)
            .finish()
    }
}

impl Serialize for KeyEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("KeyEntry", 8)?;
        s.serialize_field("identifier", &self.identifier)?;
        s.serialize_field("display_name", self.display_name())?;
        s.serialize_field("value", self.display_value())?;
        s.serialize_field("has_value", &self.has_value())?;
        s.serialize_field("validity", &self.validity)?;
        s.serialize_field("required", &self.required)?;
        s.serialize_field("configured", &self.configured)?;
        s.serialize_field("visible", &self.visible)?;
        s.end()
    }
}

/// What a save did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveOutcome {
    Stored,
    /// The value was blank, so the slot was cleared.
    Removed,
}

/// Per-identifier result of [`KeyRegistry::save_all`].
#[derive(Debug)]
pub struct SaveReport {
    pub identifier: String,
    pub result: Result<SaveOutcome, RegistryError>,
}

/// A key the validator accepted.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub identifier: String,
    pub validity: Validity,
    pub message: String,
    pub details: serde_json::Map<String, serde_json::Value>,
}

// ── In-flight tracking ──────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<String, usize>>>;

/// Marks an identifier as under test until dropped. Dropping runs on
/// every exit path, including when the test future itself is dropped.
struct InFlight {
    pending: PendingMap,
    identifier: String,
}

impl InFlight {
    fn begin(pending: &PendingMap, identifier: &str) -> Self {
        let mut map = pending.lock().unwrap_or_else(PoisonError::into_inner);
        *map.entry(identifier.to_string()).or_insert(0) += 1;
        Self { pending: Arc::clone(pending), identifier: identifier.to_string() }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = map.get_mut(&self.identifier) {
            *count -= 1;
            if *count == 0 {
                map.remove(&self.identifier);
            }
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────

pub struct KeyRegistry {
    identifiers: Vec<String>,
    namespace: String,
    store: Arc<dyn LocalStore>,
    status: Arc<dyn StatusProvider>,
    validator: Arc<dyn KeyValidator>,
    table: RwLock<Vec<KeyEntry>>,
    pending: PendingMap,
    generations: AtomicU64,
}

impl KeyRegistry {
    /// A registry over every key in the catalog.
    pub fn new(
        store: Arc<dyn LocalStore>,
        status: Arc<dyn StatusProvider>,
        validator: Arc<dyn KeyValidator>,
    ) -> Self {
        Self::with_identifiers(catalog::known_identifiers(), store, status, validator)
    }

    /// A registry over a custom identifier set. Duplicates collapse to
    /// their first occurrence.
    pub fn with_identifiers(
        identifiers: impl IntoIterator<Item = String>,
        store: Arc<dyn LocalStore>,
        status: Arc<dyn StatusProvider>,
        validator: Arc<dyn KeyValidator>,
    ) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for id in identifiers {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let table = unique.iter().map(|id| KeyEntry::new(id)).collect();
        Self {
            identifiers: unique,
            namespace: DEFAULT_NAMESPACE.to_string(),
            store,
            status,
            validator,
            table: RwLock::new(table),
            pending: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Use a different store key prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    // ── Load ──

    /// Rebuild the table from the status provider and the local store.
    ///
    /// On failure the table is reset to empty defaults and the error is
    /// returned; it is never left half-populated.
    pub async fn load(&self) -> Result<(), RegistryError> {
        let fresh = self.build_table().await;
        let mut table = self.write_table();
        match fresh {
            Ok(mut entries) => {
                for entry in &mut entries {
                    entry.generation = self.next_generation();
                }
                *table = entries;
                let stored = table.iter().filter(|e| e.has_value()).count();
                info!(keys = table.len(), stored = stored, "Key table loaded");
                Ok(())
            }
            Err(e) => {
                *table = self
                    .identifiers
                    .iter()
                    .map(|id| {
                        let mut entry = KeyEntry::new(id);
                        entry.generation = self.next_generation();
                        entry
                    })
                    .collect();
                warn!(error = %e, "Key load failed, table reset to defaults");
                Err(e)
            }
        }
    }

    async fn build_table(&self) -> Result<Vec<KeyEntry>, RegistryError> {
        let report = self.status.fetch_status().await.map_err(RegistryError::Load)?;

        self.identifiers
            .iter()
            .map(|id| {
                let stored = self
                    .store
                    .get(&namespaced_key(&self.namespace, id))
                    .map_err(|source| RegistryError::LoadStore {
                        identifier: id.clone(),
                        source,
                    })?;
                let status = report
                    .get(&catalog::provider_tag(id))
                    .copied()
                    .unwrap_or_default();

                let mut entry = KeyEntry::new(id);
                entry.value = stored.unwrap_or_default();
                entry.required = status.required;
                entry.configured = status.configured;
                Ok(entry)
            })
            .collect()
    }

    // ── Edit ──

    /// Replace the in-memory value. The old secret is wiped and the
    /// entry's validity returns to `Unknown`. No I/O.
    pub fn update(&self, identifier: &str, new_value: impl Into<String>) -> Result<(), RegistryError> {
        let new_value = new_value.into();
        let generation = self.next_generation();
        self.with_entry(identifier, |entry| {
            let mut old = std::mem::replace(&mut entry.value, new_value);
            old.zeroize();
            entry.validity = Validity::Unknown;
            entry.generation = generation;
        })
    }

    pub fn set_visible(&self, identifier: &str, visible: bool) -> Result<(), RegistryError> {
        self.with_entry(identifier, |entry| entry.visible = visible)
    }

    /// Flip reveal/hide and return the new state.
    pub fn toggle_visibility(&self, identifier: &str) -> Result<bool, RegistryError> {
        self.with_entry(identifier, |entry| {
            entry.visible = !entry.visible;
            entry.visible
        })
    }

    // ── Save ──

    /// Write the trimmed value to the local store, or clear the slot
    /// when the value is blank. Validity is not touched.
    pub fn save(&self, identifier: &str) -> Result<SaveOutcome, RegistryError> {
        let mut value = self.with_entry(identifier, |entry| entry.value.trim().to_string())?;
        let key = namespaced_key(&self.namespace, identifier);

        let result = if value.is_empty() {
            self.store.remove(&key).map(|()| SaveOutcome::Removed)
        } else {
            self.store.set(&key, &value).map(|()| SaveOutcome::Stored)
        };
        value.zeroize();

        match result {
            Ok(outcome) => {
                info!(identifier = identifier, outcome = ?outcome, "Key saved");
                Ok(outcome)
            }
            Err(source) => {
                warn!(identifier = identifier, error = %source, "Key save failed");
                Err(RegistryError::Save { identifier: identifier.to_string(), source })
            }
        }
    }

    /// Save every slot. Each save touches only its own slot, so one
    /// failure never blocks the rest.
    pub fn save_all(&self) -> Vec<SaveReport> {
        self.identifiers
            .iter()
            .map(|id| SaveReport { identifier: id.clone(), result: self.save(id) })
            .collect()
    }

    // ── Test ──

    /// Ask the validator whether the current value works.
    ///
    /// A blank value is refused up front with no network call. Any answer
    /// from the validator, or failure to get one, updates validity, unless
    /// the value was edited or reloaded while the test was in flight. The
    /// outcome is returned either way.
    pub async fn test(&self, identifier: &str) -> Result<TestOutcome, RegistryError> {
        let (api_key, generation) = self.with_entry(identifier, |entry| {
            (entry.value.trim().to_string(), entry.generation)
        })?;
        if api_key.is_empty() {
            return Err(RegistryError::NothingToTest(identifier.to_string()));
        }

        let provider = catalog::provider_tag(identifier);
        let request = TestKeyRequest {
            test_endpoint: catalog::probe_endpoint(&provider).to_string(),
            provider: provider.clone(),
            api_key,
        };

        let _in_flight = InFlight::begin(&self.pending, identifier);
        info!(identifier = identifier, provider = %provider, "Testing key");

        match self.validator.validate(&request).await {
            Ok(resp) if resp.success => {
                self.set_validity(identifier, generation, Validity::Valid);
                info!(identifier = identifier, "Key accepted");
                Ok(TestOutcome {
                    identifier: identifier.to_string(),
                    validity: Validity::Valid,
                    message: resp.message,
                    details: resp.details,
                })
            }
            Ok(resp) => {
                self.set_validity(identifier, generation, Validity::Invalid);
                info!(identifier = identifier, reason = %resp.message, "Key rejected");
                Err(RegistryError::RemoteInvalid {
                    identifier: identifier.to_string(),
                    message: resp.message,
                })
            }
            Err(source) => {
                self.set_validity(identifier, generation, Validity::Invalid);
                warn!(identifier = identifier, error = %source, "Key test could not reach validator");
                Err(RegistryError::Transport { identifier: identifier.to_string(), source })
            }
        }
    }

    /// Record a verdict for the value that was tested. A verdict for a
    /// value that has since been replaced is dropped.
    fn set_validity(&self, identifier: &str, tested: u64, validity: Validity) {
        let _ = self.with_entry(identifier, |entry| {
            if entry.generation == tested {
                entry.validity = validity;
            } else {
                debug!(identifier = identifier, "Value changed during test, verdict dropped");
            }
        });
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ── Queries ──

    /// Snapshot of every entry, in registry order.
    pub fn entries(&self) -> Vec<KeyEntry> {
        self.read_table().clone()
    }

    pub fn entry(&self, identifier: &str) -> Option<KeyEntry> {
        self.read_table().iter().find(|e| e.identifier == identifier).cloned()
    }

    pub fn validity(&self, identifier: &str) -> Option<Validity> {
        self.read_table()
            .iter()
            .find(|e| e.identifier == identifier)
            .map(|e| e.validity)
    }

    /// Whether a test of this key is still awaiting its answer.
    pub fn is_pending(&self, identifier: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identifier)
    }

    /// Identifiers currently under test, in registry order.
    pub fn pending(&self) -> Vec<String> {
        self.identifiers
            .iter()
            .filter(|id| self.is_pending(id))
            .cloned()
            .collect()
    }

    /// Required keys that have no value yet, in registry order.
    pub fn missing_required(&self) -> Vec<String> {
        self.read_table()
            .iter()
            .filter(|e| e.required && !e.has_value())
            .map(|e| e.identifier.clone())
            .collect()
    }

    pub fn all_required_satisfied(&self) -> bool {
        self.missing_required().is_empty()
    }

    // ── Internals ──

    fn read_table(&self) -> RwLockReadGuard<'_, Vec<KeyEntry>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, Vec<KeyEntry>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<R>(
        &self,
        identifier: &str,
        f: impl FnOnce(&mut KeyEntry) -> R,
    ) -> Result<R, RegistryError> {
        let mut table = self.write_table();
        match table.iter_mut().find(|e| e.identifier == identifier) {
            Some(entry) => Ok(f(entry)),
            None => {
                warn!(identifier = identifier, "Unknown key identifier");
                Err(RegistryError::UnknownIdentifier(identifier.to_string()))
            }
        }
    }
}

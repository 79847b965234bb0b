//! KeyDeck — API key settings core.
//!
//! Owns the lifecycle of third-party API keys for a settings panel:
//! editing, reveal/hide, persisting to a local store, and validating
//! against a remote endpoint. The presentation layer talks to the
//! [`keys::KeyRegistry`] directly or through the JSON-RPC [`server`].

pub mod backend;
pub mod config;
pub mod error;
pub mod keys;
pub mod probe;
pub mod server;
pub mod store;

pub use error::RegistryError;
pub use keys::{KeyEntry, KeyRegistry, SaveOutcome, SaveReport, TestOutcome, Validity};

//! Backend seams. Who says which keys are required, and who tests them.
//!
//! The registry never talks HTTP itself. It calls a [`StatusProvider`]
//! once per load and a [`KeyValidator`] once per test. Implementations
//! live in [`http`] (a remote backend) and [`crate::probe`] (direct
//! provider calls).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod http;

#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpBackend;

// ── Wire Types ──────────────────────────────────────────────────────

/// Server-side view of one provider's key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub configured: bool,
}

/// Provider tag → status, as returned by the status endpoint.
pub type StatusReport = HashMap<String, ProviderStatus>;

/// Body of a key test request.
///
/// The key is wiped from memory when the request is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct TestKeyRequest {
    pub provider: String,
    pub api_key: String,
    pub test_endpoint: String,
}

impl fmt::Debug for TestKeyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestKeyRequest")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("test_endpoint", &self.test_endpoint)
            .finish()
    }
}

/// Result of a key test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestKeyResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl TestKeyResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), details: Default::default() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), details: Default::default() }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

// ── Traits ──────────────────────────────────────────────────────────

/// Reports which provider keys the application requires and which are
/// already configured server-side.
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError>;
}

/// Tests a single key against its provider.
///
/// `Ok` means the validator answered, whatever the verdict. `Err` is
/// reserved for failing to get an answer at all.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    async fn validate(&self, req: &TestKeyRequest) -> Result<TestKeyResponse, BackendError>;
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

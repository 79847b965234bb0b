//! Environment-backed status provider.
//!
//! A provider counts as configured when its key's environment variable
//! is set to something non-blank. Only OpenAI is required.

use async_trait::async_trait;

use crate::backend::{BackendError, ProviderStatus, StatusProvider, StatusReport};
use crate::keys::catalog::{provider_tag, KNOWN_KEYS};

const REQUIRED_PROVIDERS: &[&str] = &["openai"];

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvStatus {
    lookup: Lookup,
}

impl EnvStatus {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Read through a custom variable lookup.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self { lookup: Box::new(lookup) }
    }

    /// Build the report synchronously.
    pub fn report(&self) -> StatusReport {
        KNOWN_KEYS
            .iter()
            .map(|spec| {
                let tag = provider_tag(spec.identifier);
                let configured = (self.lookup)(spec.identifier)
                    .map(|v| !v.trim().is_empty())
                    .unwrap_or(false);
                let required = REQUIRED_PROVIDERS.contains(&tag.as_str());
                (tag, ProviderStatus { required, configured })
            })
            .collect()
    }
}

impl Default for EnvStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusProvider for EnvStatus {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError> {
        Ok(self.report())
    }
}

//! Direct provider probe: tests a key by calling the provider itself.
//!
//! Used when no application backend is configured. Each provider gets
//! the cheapest authenticated request it supports; the HTTP status of
//! that request decides the verdict.
//!
//! Every answer, including timeouts and network errors on the provider
//! side, comes back as a `TestKeyResponse`. The key is sent only to
//! the provider's endpoint and is never logged.

pub mod status;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::backend::{truncate, BackendError, KeyValidator, TestKeyRequest, TestKeyResponse};

pub use status::EnvStatus;

/// Default per-probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_PROBE_MODEL: &str = "claude-3-haiku-20240307";

pub struct ProviderProbe {
    client: reqwest::Client,
}

impl ProviderProbe {
    pub fn new(timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Build the probe request for a provider, or `None` when the
    /// provider is not supported.
    fn build(&self, req: &TestKeyRequest) -> Option<reqwest::RequestBuilder> {
        let endpoint = req.test_endpoint.as_str();
        let builder = match req.provider.as_str() {
            "openai" | "groq" | "deepseek" => self
                .client
                .get(endpoint)
                .bearer_auth(&req.api_key)
                .header("content-type", "application/json"),
            "anthropic" => self
                .client
                .post(endpoint)
                .header("x-api-key", &req.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&serde_json::json!({
                    "model": ANTHROPIC_PROBE_MODEL,
                    "max_tokens": 1,
                    "messages": [{"role": "user", "content": "Hi"}]
                })),
            // Google AI takes the key as a query parameter
            "google" => self.client.get(endpoint).query(&[("key", req.api_key.as_str())]),
            "financial" => self.client.get(endpoint).header("X-API-KEY", &req.api_key),
            _ => return None,
        };
        Some(builder)
    }
}

#[async_trait]
impl KeyValidator for ProviderProbe {
    async fn validate(&self, req: &TestKeyRequest) -> Result<TestKeyResponse, BackendError> {
        let provider = req.provider.as_str();

        if req.test_endpoint.is_empty() {
            return Ok(TestKeyResponse::failed(format!(
                "No test endpoint for provider: {}",
                provider
            )));
        }
        let Some(builder) = self.build(req) else {
            return Ok(TestKeyResponse::failed(format!("Unsupported provider: {}", provider)));
        };

        let resp = match builder.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::warn!(provider = provider, "Key probe timed out");
                return Ok(TestKeyResponse::failed(format!("Timeout testing {} API key", provider))
                    .with_detail("error", "Request timeout"));
            }
            Err(e) => {
                tracing::warn!(provider = provider, error = %e, "Key probe failed to connect");
                return Ok(TestKeyResponse::failed(format!(
                    "Network error testing {} API key",
                    provider
                ))
                .with_detail("error", e.to_string()));
            }
        };

        let status = resp.status().as_u16();
        let body = if status == 200 { String::new() } else { resp.text().await.unwrap_or_default() };
        tracing::debug!(provider = provider, status = status, "Key probe answered");
        Ok(classify(provider, status, &body))
    }
}

/// Turn a provider's HTTP status into a verdict.
fn classify(provider: &str, status: u16, body: &str) -> TestKeyResponse {
    match status {
        200 => TestKeyResponse::ok(format!("{} API key is valid", title_case(provider)))
            .with_detail("status_code", status),
        401 => TestKeyResponse::failed(format!("Invalid API key for {}", provider))
            .with_detail("status_code", status)
            .with_detail("error", "Unauthorized"),
        403 => TestKeyResponse::failed(format!(
            "API key lacks required permissions for {}",
            provider
        ))
        .with_detail("status_code", status)
        .with_detail("error", "Forbidden"),
        _ => TestKeyResponse::failed(format!("API test failed for {}", provider))
            .with_detail("status_code", status)
            .with_detail("error", Value::String(truncate(body, 500).to_string())),
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

//! HTTP client for the application server's status and test endpoints.

use async_trait::async_trait;
use std::time::Duration;

use super::{
    truncate, BackendError, KeyValidator, StatusProvider, StatusReport, TestKeyRequest,
    TestKeyResponse,
};

const STATUS_PATH: &str = "/api/api-key-status";
const TEST_PATH: &str = "/api/test-api-key";

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl StatusProvider for HttpBackend {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError> {
        let resp = self.client.get(self.url(STATUS_PATH)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500).to_string(),
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl KeyValidator for HttpBackend {
    async fn validate(&self, req: &TestKeyRequest) -> Result<TestKeyResponse, BackendError> {
        let resp = self.client.post(self.url(TEST_PATH)).json(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            // The backend rejected the request outright (e.g. unsupported
            // provider). That is a failed test, not a transport problem.
            let body = resp.text().await.unwrap_or_default();
            let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
            let message = parsed["detail"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Key test failed with HTTP {}", status.as_u16()));
            return Ok(TestKeyResponse::failed(message)
                .with_detail("status_code", status.as_u16()));
        }
        Ok(resp.json().await?)
    }
}

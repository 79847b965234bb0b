//! Daemon configuration.
//!
//! Resolved in three layers: built-in defaults, then
//! `~/.keydeck/config.yaml` if present, then `KEYDECK_*` environment
//! variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::DEFAULT_NAMESPACE;

const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Effective configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub socket_path: PathBuf,
    pub store_path: PathBuf,
    /// Application backend serving the status and test endpoints.
    /// `None` means keys are probed directly against the providers.
    pub backend_url: Option<String>,
    pub namespace: String,
    pub request_timeout: Duration,
}

/// On-disk form. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub namespace: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Read a config file; a missing file yields the empty config.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }
}

impl Config {
    /// Load from the user's home directory and the process environment.
    pub fn load() -> Result<Self> {
        let env = |name: &str| std::env::var(name).ok();
        let data_dir = match env("KEYDECK_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("Cannot determine home directory")?
                .join(".keydeck"),
        };
        let file = FileConfig::read(&data_dir.join(CONFIG_FILE))?;
        Ok(Self::resolve(data_dir, file, env))
    }

    /// Merge defaults, file values and environment overrides.
    /// `data_dir` is the default, used when neither layer names one.
    pub fn resolve(
        data_dir: PathBuf,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let data_dir = env("KEYDECK_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or(data_dir);

        let socket_path = env("KEYDECK_SOCKET")
            .map(PathBuf::from)
            .or(file.socket_path)
            .unwrap_or_else(|| data_dir.join("keydeck.sock"));
        let store_path = file.store_path.unwrap_or_else(|| data_dir.join("keydeck.db"));
        let backend_url = env("KEYDECK_BACKEND_URL")
            .or(file.backend_url)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        Self {
            socket_path,
            store_path,
            backend_url,
            namespace: file.namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            request_timeout: Duration::from_secs(
                file.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            data_dir,
        }
    }
}

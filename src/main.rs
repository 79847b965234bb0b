//! KeyDeck daemon — serves the API key settings panel.
//!
//! Listens on a Unix socket for JSON-RPC requests from the panel UI.
//! Saved values live in a local SQLite store; status and key tests go
//! either to the application backend or straight to the providers.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use keydeck::backend::{HttpBackend, KeyValidator, StatusProvider};
use keydeck::config::Config;
use keydeck::probe::{EnvStatus, ProviderProbe};
use keydeck::server::Server;
use keydeck::store::SqliteStore;
use keydeck::KeyRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keydeck=info".into()),
        )
        .with_target(false)
        .init();

    info!("🔑 KeyDeck v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("Failed to load configuration")?;
    std::fs::create_dir_all(&config.data_dir)?;

    // ── Local Store ─────────────────────────────────────────────────
    let store = Arc::new(
        SqliteStore::open(&config.store_path).context("Failed to open local key store")?,
    );

    // ── Remote Side ─────────────────────────────────────────────────
    let (status, validator): (Arc<dyn StatusProvider>, Arc<dyn KeyValidator>) =
        match &config.backend_url {
            Some(url) => {
                info!(backend = %url, "Using application backend for status and key tests");
                let backend = Arc::new(
                    HttpBackend::new(url, config.request_timeout)
                        .context("Failed to build backend client")?,
                );
                let status: Arc<dyn StatusProvider> = backend.clone();
                (status, backend)
            }
            None => {
                info!("No backend configured, probing providers directly");
                let probe = ProviderProbe::new(config.request_timeout)
                    .context("Failed to build probe client")?;
                let status: Arc<dyn StatusProvider> = Arc::new(EnvStatus::new());
                (status, Arc::new(probe))
            }
        };

    // ── Registry ────────────────────────────────────────────────────
    let registry = Arc::new(
        KeyRegistry::new(store, status, validator).with_namespace(config.namespace.clone()),
    );

    // A failed first load leaves default entries; keys.reload retries.
    if let Err(e) = registry.load().await {
        warn!(error = %e, "Initial key load failed");
    }
    let missing = registry.missing_required();
    if !missing.is_empty() {
        info!(missing = ?missing, "Required keys not yet configured");
    }

    // ── JSON-RPC Server ─────────────────────────────────────────────
    let srv = Server::new(config.socket_path, registry);
    srv.run().await?;

    Ok(())
}

//! Unix socket JSON-RPC server for the settings panel.
//!
//! Listens on ~/.keydeck/keydeck.sock for newline-delimited JSON-RPC 2.0
//! requests. Local-only, no TCP exposure. Each UI event (edit, reveal,
//! save, test) maps to one method call on the shared registry.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, info};

use crate::keys::KeyRegistry;
use crate::RegistryError;

// ── JSON-RPC Types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".into(), result: Some(result), error: None, id }
    }
    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self { jsonrpc: "2.0".into(), result: None, error: Some(JsonRpcError { code, message }), id }
    }
    fn registry_error(id: Option<Value>, err: &RegistryError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }
    fn missing_param(id: Option<Value>, name: &str) -> Self {
        Self::error(id, -32602, format!("Missing required param: {}", name))
    }
}

// ── Server ──────────────────────────────────────────────────────────

pub struct Server {
    socket_path: PathBuf,
    registry: Arc<KeyRegistry>,
}

impl Server {
    pub fn new(socket_path: PathBuf, registry: Arc<KeyRegistry>) -> Self {
        Self { socket_path, registry }
    }

    pub async fn run(&self) -> Result<()> {
        // Remove stale socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner-only: the socket hands out secrets when asked to reveal them
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(socket = %self.socket_path.display(), "🔑 KeyDeck server listening");

        loop {
            let (stream, _) = listener.accept().await?;
            let registry = Arc::clone(&self.registry);

            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                // Bound reads to 1 MB per connection
                const MAX_REQUEST_BYTES: u64 = 1_048_576;
                let bounded = reader.take(MAX_REQUEST_BYTES);
                let mut reader = BufReader::new(bounded);
                let mut line = String::new();

                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) => break, // EOF
                        Ok(_) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let response = handle_request(&line, &registry).await;
                            let resp_json = serde_json::to_string(&response).unwrap_or_default();
                            if writer.write_all(resp_json.as_bytes()).await.is_err() { break; }
                            if writer.write_all(b"\n").await.is_err() { break; }
                        }
                        Err(_) => break,
                    }
                }
            });
        }
    }
}

// ── Request Handling ────────────────────────────────────────────────

pub async fn handle_request(raw: &str, registry: &KeyRegistry) -> JsonRpcResponse {
    let req: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => return JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e)),
    };

    debug!(method = %req.method, "RPC request");
    let params = req.params.unwrap_or(Value::Null);

    match req.method.as_str() {
        "keys.list" => handle_list(req.id, registry),
        "keys.get" => handle_get(req.id, params, registry),
        "keys.update" => handle_update(req.id, params, registry),
        "keys.setVisible" => handle_set_visible(req.id, params, registry),
        "keys.toggleVisibility" => handle_toggle_visibility(req.id, params, registry),
        "keys.save" => handle_save(req.id, params, registry),
        "keys.saveAll" => handle_save_all(req.id, registry),
        "keys.test" => handle_test(req.id, params, registry).await,
        "keys.reload" => handle_reload(req.id, registry).await,
        "keys.missingRequired" => handle_missing_required(req.id, registry),
        _ => JsonRpcResponse::error(req.id, -32601, format!("Unknown method: {}", req.method)),
    }
}

fn key_param(params: &Value) -> Option<&str> {
    params.get("key").and_then(|v| v.as_str())
}

fn handle_list(id: Option<Value>, registry: &KeyRegistry) -> JsonRpcResponse {
    JsonRpcResponse::success(id, json!({
        "keys": registry.entries(),
        "pending": registry.pending(),
        "missing_required": registry.missing_required(),
        "all_required_satisfied": registry.all_required_satisfied(),
    }))
}

fn handle_get(id: Option<Value>, params: Value, registry: &KeyRegistry) -> JsonRpcResponse {
    let Some(key) = key_param(&params) else {
        return JsonRpcResponse::missing_param(id, "key");
    };
    match registry.entry(key) {
        Some(entry) => JsonRpcResponse::success(id, json!({
            "key": entry,
            "pending": registry.is_pending(key),
        })),
        None => JsonRpcResponse::registry_error(id, &RegistryError::UnknownIdentifier(key.to_string())),
    }
}

fn handle_update(id: Option<Value>, params: Value, registry: &KeyRegistry) -> JsonRpcResponse {
    let key = key_param(&params);
    let value = params.get("value").and_then(|v| v.as_str());
    match (key, value) {
        (Some(key), Some(value)) => match registry.update(key, value) {
            Ok(()) => JsonRpcResponse::success(id, json!({"ok": true, "key": key})),
            Err(e) => JsonRpcResponse::registry_error(id, &e),
        },
        _ => JsonRpcResponse::error(id, -32602, "Missing required params: key, value".into()),
    }
}

fn handle_set_visible(id: Option<Value>, params: Value, registry: &KeyRegistry) -> JsonRpcResponse {
    let key = key_param(&params);
    let visible = params.get("visible").and_then(|v| v.as_bool());
    match (key, visible) {
        (Some(key), Some(visible)) => match registry.set_visible(key, visible) {
            Ok(()) => JsonRpcResponse::success(id, json!({"ok": true, "visible": visible})),
            Err(e) => JsonRpcResponse::registry_error(id, &e),
        },
        _ => JsonRpcResponse::error(id, -32602, "Missing required params: key, visible".into()),
    }
}

fn handle_toggle_visibility(id: Option<Value>, params: Value, registry: &KeyRegistry) -> JsonRpcResponse {
    let Some(key) = key_param(&params) else {
        return JsonRpcResponse::missing_param(id, "key");
    };
    match registry.toggle_visibility(key) {
        Ok(visible) => JsonRpcResponse::success(id, json!({"ok": true, "visible": visible})),
        Err(e) => JsonRpcResponse::registry_error(id, &e),
    }
}

fn handle_save(id: Option<Value>, params: Value, registry: &KeyRegistry) -> JsonRpcResponse {
    let Some(key) = key_param(&params) else {
        return JsonRpcResponse::missing_param(id, "key");
    };
    match registry.save(key) {
        Ok(outcome) => JsonRpcResponse::success(id, json!({"ok": true, "outcome": outcome})),
        Err(e) => JsonRpcResponse::registry_error(id, &e),
    }
}

fn handle_save_all(id: Option<Value>, registry: &KeyRegistry) -> JsonRpcResponse {
    let reports = registry.save_all();

    let results: Vec<Value> = reports.iter().map(|r| {
        match &r.result {
            Ok(outcome) => json!({"key": r.identifier, "ok": true, "outcome": outcome}),
            Err(e) => json!({"key": r.identifier, "ok": false, "error": e.to_string()}),
        }
    }).collect();
    let failed = reports.iter().filter(|r| r.result.is_err()).count();

    JsonRpcResponse::success(id, json!({
        "results": results,
        "failed": failed,
    }))
}

async fn handle_test(id: Option<Value>, params: Value, registry: &KeyRegistry) -> JsonRpcResponse {
    let Some(key) = key_param(&params) else {
        return JsonRpcResponse::missing_param(id, "key");
    };
    match registry.test(key).await {
        Ok(outcome) => JsonRpcResponse::success(id, json!({
            "ok": true,
            "validity": outcome.validity,
            "message": outcome.message,
            "details": outcome.details,
        })),
        Err(e) => JsonRpcResponse::registry_error(id, &e),
    }
}

async fn handle_reload(id: Option<Value>, registry: &KeyRegistry) -> JsonRpcResponse {
    match registry.load().await {
        Ok(()) => JsonRpcResponse::success(id, json!({"ok": true, "keys": registry.entries()})),
        Err(e) => JsonRpcResponse::registry_error(id, &e),
    }
}

fn handle_missing_required(id: Option<Value>, registry: &KeyRegistry) -> JsonRpcResponse {
    let missing = registry.missing_required();
    JsonRpcResponse::success(id, json!({
        "all_required_satisfied": missing.is_empty(),
        "missing": missing,
    }))
}

//! Test doubles shared by the unit tests of several modules.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::{
    BackendError, KeyValidator, ProviderStatus, StatusProvider, StatusReport, TestKeyRequest,
    TestKeyResponse,
};

// ── One-shot HTTP responder ─────────────────────────────────────────

/// Accept one connection, answer it with `status_line` and `body`, and
/// hand back the raw request text through the join handle.
pub(crate) async fn serve_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
        request
    });

    (format!("http://{}", addr), handle)
}

/// Accept one connection and never answer it. Abort the handle to
/// release the socket.
pub(crate) async fn serve_silently() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    });

    (format!("http://{}", addr), handle)
}

/// A URL nothing is listening on.
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let body_len = text[..end]
                .lines()
                .find_map(|line| {
                    let lower = line.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// ── Status provider ─────────────────────────────────────────────────

pub(crate) struct MockStatus {
    report: Option<StatusReport>,
}

impl MockStatus {
    pub(crate) fn with(entries: &[(&str, bool, bool)]) -> Self {
        let report = entries
            .iter()
            .map(|(tag, required, configured)| {
                (
                    tag.to_string(),
                    ProviderStatus { required: *required, configured: *configured },
                )
            })
            .collect();
        Self { report: Some(report) }
    }

    pub(crate) fn failing() -> Self {
        Self { report: None }
    }
}

#[async_trait]
impl StatusProvider for MockStatus {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError> {
        self.report
            .clone()
            .ok_or_else(|| BackendError::Status { status: 503, body: "status endpoint down".into() })
    }
}

// ── Validator ───────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) enum Reply {
    Valid,
    Invalid(&'static str),
    Unreachable,
}

pub(crate) struct MockValidator {
    reply: Mutex<Reply>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    last: Mutex<Option<TestKeyRequest>>,
}

impl MockValidator {
    pub(crate) fn replying(reply: Reply) -> Self {
        Self { reply: Mutex::new(reply), gate: None, calls: AtomicUsize::new(0), last: Mutex::new(None) }
    }

    /// Hold every call until the gate is notified.
    pub(crate) fn gated(reply: Reply, gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate), ..Self::replying(reply) }
    }

    pub(crate) fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<TestKeyRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyValidator for MockValidator {
    async fn validate(&self, req: &TestKeyRequest) -> Result<TestKeyResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(req.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Valid => Ok(TestKeyResponse::ok("key is valid")),
            Reply::Invalid(msg) => Ok(TestKeyResponse::failed(msg)),
            Reply::Unreachable => {
                Err(BackendError::Status { status: 502, body: "connection refused".into() })
            }
        }
    }
}

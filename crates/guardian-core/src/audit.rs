//! Structured audit log: a capacity-bounded ring buffer with broadcast
//! fan-out (feeds the event hub's SSE stream) plus optional best-effort JSONL
//! persistence. Emission is fire-and-forget and must never block a proxy
//! decision.

use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::error::Result;

pub const DEFAULT_CAPACITY: usize = 5000;
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Allowed,
    Denied,
    ApprovedByUser,
    Timeout,
    AuthFailure,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::ApprovedByUser => "approved-by-user",
            Self::Timeout => "timeout",
            Self::AuthFailure => "auth-failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: time::OffsetDateTime,
    pub token_prefix: String,
    pub domain: String,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type AuditSender = tokio::sync::mpsc::Sender<AuditEntry>;

pub struct AuditBuffer {
    buf: Arc<RwLock<VecDeque<AuditEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<AuditEntry>,
    writer: Arc<Mutex<Option<tokio::fs::File>>>,
}

impl AuditBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            buf: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
            tx,
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn enable_persistence(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
        let mut guard = self.writer.lock().await;
        *guard = Some(file);
        Ok(())
    }

    pub async fn push(&self, entry: AuditEntry) {
        let _ = self.tx.send(entry.clone());
        {
            let mut buf = self.buf.write().await;
            if buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(entry.clone());
        }
        let mut guard = self.writer.lock().await;
        if let Some(file) = guard.as_mut() {
            if let Ok(line) = serde_json::to_string(&entry) {
                use tokio::io::AsyncWriteExt;
                let _ = file.write_all(line.as_bytes()).await;
                let _ = file.write_all(b"\n").await;
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.tx.subscribe()
    }

    pub async fn list(&self, limit: usize) -> Vec<AuditEntry> {
        let buf = self.buf.read().await;
        buf.iter().rev().take(limit).cloned().collect::<Vec<_>>().into_iter().rev().collect()
    }
}

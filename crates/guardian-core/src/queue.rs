//! Generic approval queue shared by the command queue (C5) and the domain
//! queue (C6). Both have the same shape: assign an id, start a timeout timer,
//! hold the request until a human posts a verdict or the timer fires, deliver
//! exactly one verdict on a single-shot channel.

use std::{sync::Mutex, time::Duration};

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// A verdict type usable with `ApprovalQueue` must be able to synthesize its
/// own "the timer fired, nobody answered" value.
pub trait TimeoutVerdict: Clone + Send + 'static {
    fn timeout() -> Self;
}

struct Entry<R, V> {
    id: String,
    request: R,
    tx: Option<oneshot::Sender<V>>,
}

/// Ordered collection of pending human decisions. `list()` returns requests in
/// insertion order with response channels omitted, matching the boundary rule
/// that the channel never leaves the Guardian process.
pub struct ApprovalQueue<R, V> {
    default_timeout: Duration,
    entries: Mutex<Vec<Entry<R, V>>>,
}

impl<R, V> ApprovalQueue<R, V>
where
    R: Clone + Send + Sync + 'static,
    V: TimeoutVerdict,
{
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Insert a request, returning its id and the receiving half of its
    /// single-shot verdict channel. Starts a timeout timer using `expires_in`
    /// if given, otherwise the queue's default.
    pub fn add(
        self: &std::sync::Arc<Self>,
        id: String,
        request: R,
        expires_in: Option<Duration>,
    ) -> oneshot::Receiver<V> {
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            guard.push(Entry {
                id: id.clone(),
                request,
                tx: Some(tx),
            });
        }
        let timeout = expires_in.unwrap_or(self.default_timeout);
        let queue = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            queue.fire_timeout(&id);
        });
        rx
    }

    fn fire_timeout(&self, id: &str) {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = guard.iter().position(|e| e.id == id) {
            let mut entry = guard.remove(pos);
            if let Some(tx) = entry.tx.take() {
                let _ = tx.send(V::timeout());
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<R> {
        let guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.iter().find(|e| e.id == id).map(|e| e.request.clone())
    }

    pub fn list(&self) -> Vec<R> {
        let guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.iter().map(|e| e.request.clone()).collect()
    }

    /// Deliver a verdict and drop the request from the queue. Exactly one of
    /// `resolve` or the timeout timer wins the race for a given id; whichever
    /// acts first removes the entry and the other becomes a no-op `NotFound`.
    pub fn resolve(&self, id: &str, verdict: V) -> Result<()> {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let pos = guard
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::not_found(format!("approval request not found: {id}")))?;
        let mut entry = guard.remove(pos);
        if let Some(tx) = entry.tx.take() {
            let _ = tx.send(verdict);
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|e| e.id != id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Block on a pending request's verdict channel. The channel closing without
/// a send (sender dropped) is treated the same as a timeout: the requester is
/// guaranteed to observe *some* terminal value.
pub async fn wait_for_verdict<V: TimeoutVerdict>(rx: oneshot::Receiver<V>) -> V {
    match rx.await {
        Ok(verdict) => verdict,
        Err(_) => V::timeout(),
    }
}

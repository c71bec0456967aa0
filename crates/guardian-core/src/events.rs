//! Event hub backing the approval UI's server-sent-events stream (part of
//! C7). Decoupled from the approval queues themselves: `ApprovalQueue<R, V>`
//! stays fully generic, so whoever owns an `add`/verdict-resolution call site
//! (the domain approver, a future command approver) publishes here directly
//! instead of the queue doing it on their behalf.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{PendingCommandRequest, PendingDomainRequest};

const DEFAULT_CAPACITY: usize = 256;

/// One of the four SSE event kinds the UI subscribes to.
#[derive(Debug, Clone)]
pub enum UiEvent {
    RequestAdded(PendingCommandRequest),
    RequestRemoved(String),
    DomainRequestAdded(PendingDomainRequest),
    DomainRequestRemoved(String),
}

#[derive(Serialize)]
struct RemovedPayload<'a> {
    id: &'a str,
}

impl UiEvent {
    /// SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestAdded(_) => "request-added",
            Self::RequestRemoved(_) => "request-removed",
            Self::DomainRequestAdded(_) => "domain-request-added",
            Self::DomainRequestRemoved(_) => "domain-request-removed",
        }
    }

    /// SSE `data:` payload — JSON of the affected request, or `{id}` for a
    /// removal.
    pub fn data(&self) -> String {
        match self {
            Self::RequestAdded(r) => serde_json::to_string(r).unwrap_or_default(),
            Self::DomainRequestAdded(r) => serde_json::to_string(r).unwrap_or_default(),
            Self::RequestRemoved(id) | Self::DomainRequestRemoved(id) => {
                serde_json::to_string(&RemovedPayload { id }).unwrap_or_default()
            },
        }
    }
}

/// Broadcast fan-out of `UiEvent`s. Cheap to clone-by-`Arc`; a fresh
/// subscriber only sees events published after it subscribes, matching the
/// audit buffer's live-tail behaviour.
pub struct EventHub {
    tx: broadcast::Sender<UiEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget: no subscribers is not an error.
    pub fn publish(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_req(id: &str) -> PendingDomainRequest {
        PendingDomainRequest {
            id: id.to_string(),
            cloister: "c".into(),
            project: "p".into(),
            domain: "example.com".into(),
            token: "secret-token".into(),
            timestamp: time::OffsetDateTime::UNIX_EPOCH,
            expires_at: time::OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn event_names_match_sse_contract() {
        assert_eq!(UiEvent::RequestAdded(command_req("1")).name(), "request-added");
        assert_eq!(UiEvent::RequestRemoved("1".into()).name(), "request-removed");
        assert_eq!(UiEvent::DomainRequestAdded(domain_req("1")).name(), "domain-request-added");
        assert_eq!(UiEvent::DomainRequestRemoved("1".into()).name(), "domain-request-removed");
    }

    #[test]
    fn removed_payload_carries_only_the_id() {
        let event = UiEvent::DomainRequestRemoved("abc".into());
        assert_eq!(event.data(), r#"{"id":"abc"}"#);
    }

    #[test]
    fn domain_added_payload_omits_token() {
        let event = UiEvent::DomainRequestAdded(domain_req("1"));
        assert!(!event.data().contains("secret-token"));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = EventHub::new(16);
        let mut rx = hub.subscribe();
        hub.publish(UiEvent::DomainRequestRemoved("xyz".into()));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "domain-request-removed");
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let hub = EventHub::new(4);
        hub.publish(UiEvent::RequestRemoved("none".into()));
    }

    fn command_req(id: &str) -> PendingCommandRequest {
        PendingCommandRequest {
            id: id.to_string(),
            cloister: "c".into(),
            project: "p".into(),
            branch: "main".into(),
            agent: "agent".into(),
            cmd: "ls".into(),
            timestamp: time::OffsetDateTime::UNIX_EPOCH,
        }
    }
}

//! Request/verdict shapes shared by the two approval queues (C5, C6) and the
//! policy resolver (C8).

use serde::{Deserialize, Serialize};

use crate::queue::TimeoutVerdict;

/// Default proxy listen port.
pub const DEFAULT_PROXY_PORT: u16 = 3128;

/// How far a human verdict propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Session,
    Project,
    Global,
}

/// Outcome of the policy resolver (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    Deny,
    AskHuman,
}

/// A pending host-command approval (C5).
#[derive(Debug, Clone, Serialize)]
pub struct PendingCommandRequest {
    pub id: String,
    pub cloister: String,
    pub project: String,
    pub branch: String,
    pub agent: String,
    pub cmd: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: time::OffsetDateTime,
}

/// Verdict for a pending command request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum CommandVerdict {
    Approved,
    Denied,
    Timeout,
}

impl TimeoutVerdict for CommandVerdict {
    fn timeout() -> Self {
        CommandVerdict::Timeout
    }
}

/// A pending domain-access approval (C6). `domain` is host-only, no port.
#[derive(Debug, Clone, Serialize)]
pub struct PendingDomainRequest {
    pub id: String,
    pub cloister: String,
    pub project: String,
    pub domain: String,
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: time::OffsetDateTime,
}

/// Verdict for a pending domain request. `pattern`, when present alongside a
/// `project`/`global` scope, directs the persister to record a glob pattern
/// instead of an exact host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainVerdict {
    Approved { scope: Scope, pattern: Option<String> },
    Denied { scope: Scope, pattern: Option<String>, reason: Option<String> },
    Timeout,
}

impl TimeoutVerdict for DomainVerdict {
    fn timeout() -> Self {
        DomainVerdict::Timeout
    }
}

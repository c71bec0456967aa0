pub mod audit;
pub mod cache;
pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod matcher;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod token;
pub mod types;

pub use audit::{AuditAction, AuditBuffer, AuditEntry, AuditSender};
pub use cache::{AllowlistCache, CacheSnapshot, ProjectPolicy};
pub use config::GuardianConfig;
pub use decision::{DecisionFile, DecisionPersister, NoopReloadNotifier, ReloadNotifier};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventHub, UiEvent};
pub use matcher::{Allowlist, Denylist, DomainPattern, HostSet};
pub use queue::{ApprovalQueue, TimeoutVerdict};
pub use resolver::decide;
pub use session::SessionLists;
pub use token::{generate_token, TokenBinding, TokenRegistry};
pub use types::{CommandVerdict, DomainVerdict, Outcome, PendingCommandRequest, PendingDomainRequest, Scope, DEFAULT_PROXY_PORT};

/// Approval queue for host commands (C5).
pub type CommandQueue = queue::ApprovalQueue<types::PendingCommandRequest, types::CommandVerdict>;
/// Approval queue for domain access (C6).
pub type DomainQueue = queue::ApprovalQueue<types::PendingDomainRequest, types::DomainVerdict>;

//! Bridges the domain approval queue (C6) to the proxy (C9): validates the
//! requested authority, enqueues a `PendingDomainRequest`, blocks on its
//! verdict, and translates the verdict into session/project/global state
//! changes per §4.9.

use std::{sync::Arc, time::Duration};

use guardian_core::{
    cache::AllowlistCache,
    decision::DecisionPersister,
    events::{EventHub, UiEvent},
    matcher::{Allowlist, Denylist, DomainPattern},
    queue::{wait_for_verdict, ApprovalQueue},
    session::SessionLists,
    types::{DomainVerdict, Outcome, PendingDomainRequest, Scope},
    DomainQueue,
};
use tracing::warn;

/// Render a parsed `DomainPattern` back into the glob syntax `DomainPattern::parse` accepts.
fn pattern_source(pattern: &DomainPattern) -> String {
    match pattern {
        DomainPattern::Wildcard => "*".to_string(),
        DomainPattern::WildcardSubdomain(suffix) => format!("*.{suffix}"),
        DomainPattern::Exact(host) => host.clone(),
    }
}

/// Non-HTTP services that must never be reachable through the proxy even
/// when the requested port is otherwise unrestricted (dev-server high ports
/// are fine; database/SSH/SMTP ports are not).
const BLOCKED_PORTS: &[u16] = &[22, 25, 3306, 5432, 6379, 27017];

/// Split `host:port` (bracketed IPv6 aware) into host and an optional port.
fn split_authority(authority: &str) -> (String, Option<u16>) {
    if let Some(rest) = authority.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = rest[..end].to_string();
            let port = rest[end + 1..].strip_prefix(':').and_then(|p| p.parse().ok());
            return (host, port);
        }
        return (rest.to_string(), None);
    }
    match authority.rfind(':') {
        Some(idx) if authority[..idx].matches(':').count() == 0 => {
            let host = authority[..idx].to_string();
            let port = authority[idx + 1..].parse().ok();
            (host, port)
        },
        _ => (authority.to_string(), None),
    }
}

/// Validate a CONNECT authority and return the host-only form (no port) the
/// human sees and the decision files store. Rejects scheme prefixes, invalid
/// characters, and ports that belong to non-HTTP services.
pub fn validate_domain(authority: &str) -> Result<String, String> {
    if authority.contains("://") {
        return Err("invalid domain: scheme prefix not allowed".to_string());
    }
    let (host, port) = split_authority(authority);
    if host.is_empty() {
        return Err("invalid domain: empty host".to_string());
    }
    let valid_chars = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if !valid_chars {
        return Err("invalid domain: invalid characters".to_string());
    }
    if let Some(p) = port {
        if BLOCKED_PORTS.contains(&p) {
            return Err(format!("invalid domain: port {p} is not permitted"));
        }
    }
    Ok(host.to_lowercase())
}

pub struct DomainApprover {
    queue: Arc<DomainQueue>,
    sessions: Arc<SessionLists>,
    cache: Arc<AllowlistCache>,
    persister: Arc<DecisionPersister>,
    events: Arc<EventHub>,
}

impl DomainApprover {
    pub fn new(
        timeout: Duration,
        sessions: Arc<SessionLists>,
        cache: Arc<AllowlistCache>,
        persister: Arc<DecisionPersister>,
        events: Arc<EventHub>,
    ) -> Self {
        Self {
            queue: Arc::new(ApprovalQueue::new(timeout)),
            sessions,
            cache,
            persister,
            events,
        }
    }

    pub fn queue(&self) -> &Arc<DomainQueue> {
        &self.queue
    }

    #[tracing::instrument(skip(self, token), fields(project, cloister, host))]
    pub async fn request_approval(&self, project: &str, cloister: &str, authority: &str, token: &str) -> Outcome {
        let host = match validate_domain(authority) {
            Ok(h) => h,
            Err(reason) => {
                warn!(%reason, "domain approver: rejecting malformed request");
                return Outcome::Deny;
            },
        };

        let now = time::OffsetDateTime::now_utc();
        let id = uuid::Uuid::new_v4().to_string();
        let request = PendingDomainRequest {
            id: id.clone(),
            cloister: cloister.to_string(),
            project: project.to_string(),
            domain: host.clone(),
            token: token.to_string(),
            timestamp: now,
            expires_at: now + self.queue.default_timeout(),
        };
        let rx = self.queue.add(id.clone(), request.clone(), None);
        self.events.publish(UiEvent::DomainRequestAdded(request));
        let verdict = wait_for_verdict(rx).await;
        self.events.publish(UiEvent::DomainRequestRemoved(id));
        self.apply_verdict(project, &host, token, verdict)
    }

    fn apply_verdict(&self, project: &str, host: &str, token: &str, verdict: DomainVerdict) -> Outcome {
        match verdict {
            DomainVerdict::Approved { scope, pattern } => {
                match scope {
                    Scope::Session => {
                        let _ = self.sessions.add_allow(token, host);
                        self.add_to_project_cache_in_memory(project, host);
                    },
                    Scope::Project => {
                        self.persist_approval(project, scope, host, pattern.as_deref());
                        let _ = self.sessions.add_allow(token, host);
                    },
                    Scope::Global => {
                        self.persist_approval(project, scope, host, pattern.as_deref());
                    },
                }
                Outcome::Allow
            },
            DomainVerdict::Denied { scope, pattern, .. } => {
                if scope == Scope::Session {
                    let _ = self.sessions.add_deny(token, host);
                } else {
                    self.persist_denial(project, scope, host, pattern.as_deref());
                }
                Outcome::Deny
            },
            DomainVerdict::Timeout => Outcome::Deny,
        }
    }

    /// Persist a project/global verdict's disk side effect synchronously, so
    /// an HTTP caller (the approval UI) can guarantee the write lands before
    /// its POST response is sent, independent of when the proxy task blocked
    /// in `request_approval` wakes up and runs `apply_verdict` itself. A
    /// session-scope verdict has nothing to persist.
    pub fn persist_verdict(&self, project: &str, host: &str, verdict: &DomainVerdict) {
        match verdict {
            DomainVerdict::Approved { scope, pattern } if *scope != Scope::Session => {
                self.persist_approval(project, *scope, host, pattern.as_deref());
            },
            DomainVerdict::Denied { scope, pattern, .. } if *scope != Scope::Session => {
                self.persist_denial(project, *scope, host, pattern.as_deref());
            },
            _ => {},
        }
    }

    fn persist_approval(&self, project: &str, scope: Scope, host: &str, pattern: Option<&str>) {
        let result = match (scope, pattern) {
            (Scope::Global, Some(p)) => self.persister.add_pattern_to_global(p),
            (Scope::Global, None) => self.persister.add_domain_to_global(host),
            (_, Some(p)) => self.persister.add_pattern_to_project(project, p),
            (_, None) => self.persister.add_domain_to_project(project, host),
        };
        if let Err(e) = result {
            warn!(error = %e, "domain approver: failed to persist approval");
        }
        // Global writes land in the global decision file; the next full
        // reload (C10) picks them up merged with the baseline config. Only a
        // project-scope write can be reflected into the cache immediately
        // without that merge.
        if scope != Scope::Global {
            self.refresh_project_cache(project);
        }
    }

    fn persist_denial(&self, project: &str, scope: Scope, host: &str, pattern: Option<&str>) {
        let result = match (scope, pattern) {
            (Scope::Global, Some(p)) => self.persister.add_denied_pattern_to_global(p),
            (Scope::Global, None) => self.persister.add_denied_domain_to_global(host),
            (_, Some(p)) => self.persister.add_denied_pattern_to_project(project, p),
            (_, None) => self.persister.add_denied_domain_to_project(project, host),
        };
        if let Err(e) = result {
            warn!(error = %e, "domain approver: failed to persist denial");
        }
    }

    /// A session-scope approval is per-token, but letting sibling
    /// connections from the same project skip a redundant prompt only costs
    /// an in-memory cache entry, not a disk write: extend the project's
    /// current allowlist without touching C11.
    fn add_to_project_cache_in_memory(&self, project: &str, host: &str) {
        let snapshot = self.cache.snapshot();
        let mut domains: Vec<String> = snapshot
            .project_allow(project)
            .map(|a| a.domains().to_vec())
            .unwrap_or_default();
        if domains.iter().any(|d| d == host) {
            return;
        }
        domains.push(host.to_string());
        let patterns = snapshot
            .project_allow(project)
            .map(|a| a.patterns().to_vec())
            .unwrap_or_default();
        let deny = snapshot.project_deny(project).cloned().unwrap_or_default();
        let allow = Allowlist::from_domains_and_patterns(
            domains,
            patterns.into_iter().map(|p| pattern_source(&p)),
        );
        self.cache.set_project(project, allow, deny);
    }

    /// Project-scope approvals should unblock sibling connections from the
    /// same project without waiting for the next full reload.
    fn refresh_project_cache(&self, project: &str) {
        let file = match self.persister.read_project(project) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "domain approver: failed to re-read project decisions");
                return;
            },
        };
        self.cache.set_project(
            project,
            Allowlist::from_domains_and_patterns(file.domains, file.patterns),
            Denylist::from_domains_and_patterns(file.denied_domains, file.denied_patterns),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_domain_rejects_scheme_prefix() {
        assert!(validate_domain("https://example.com:443").is_err());
    }

    #[test]
    fn validate_domain_rejects_blocked_port() {
        assert!(validate_domain("db.internal:3306").is_err());
        assert!(validate_domain("mail.internal:25").is_err());
    }

    #[test]
    fn validate_domain_allows_arbitrary_high_ports() {
        assert_eq!(validate_domain("localhost:5173").unwrap(), "localhost");
    }

    #[test]
    fn validate_domain_allows_standard_web_ports() {
        assert_eq!(validate_domain("api.example.com:443").unwrap(), "api.example.com");
        assert_eq!(validate_domain("api.example.com:80").unwrap(), "api.example.com");
    }

    #[test]
    fn validate_domain_rejects_empty_host() {
        assert!(validate_domain(":443").is_err());
    }

    #[test]
    fn validate_domain_strips_port_and_lowercases() {
        assert_eq!(validate_domain("API.Example.COM:8443").unwrap(), "api.example.com");
    }

    #[tokio::test]
    async fn session_approval_unblocks_subsequent_requests_from_same_token() {
        let sessions = Arc::new(SessionLists::new());
        let cache = Arc::new(AllowlistCache::new());
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let events = Arc::new(EventHub::new(16));
        let approver = DomainApprover::new(Duration::from_millis(50), sessions.clone(), cache, persister, events);

        let queue = Arc::clone(approver.queue());
        let pending = Arc::new(approver);
        let pending_clone = Arc::clone(&pending);
        let handle = tokio::spawn(async move {
            pending_clone
                .request_approval("proj", "c1", "new.example.com:443", "tok")
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let id = queue.list().first().unwrap().id.clone();
        queue
            .resolve(
                &id,
                DomainVerdict::Approved {
                    scope: Scope::Session,
                    pattern: None,
                },
            )
            .unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, Outcome::Allow);
        assert!(sessions.is_allowed("tok", "new.example.com"));
    }

    #[tokio::test]
    async fn timeout_denies_without_persisting() {
        let sessions = Arc::new(SessionLists::new());
        let cache = Arc::new(AllowlistCache::new());
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let events = Arc::new(EventHub::new(16));
        let approver = DomainApprover::new(Duration::from_millis(20), sessions, cache, persister.clone(), events);

        let outcome = approver.request_approval("proj", "c1", "slow.example.com:443", "tok").await;
        assert_eq!(outcome, Outcome::Deny);
        assert!(persister.read_project("proj").unwrap().domains.is_empty());
    }

    #[test]
    fn persist_verdict_writes_project_approval_ahead_of_queue_resolution() {
        let sessions = Arc::new(SessionLists::new());
        let cache = Arc::new(AllowlistCache::new());
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let events = Arc::new(EventHub::new(16));
        let approver = DomainApprover::new(Duration::from_secs(30), sessions, cache, persister.clone(), events);

        let verdict = DomainVerdict::Approved { scope: Scope::Project, pattern: None };
        approver.persist_verdict("proj", "new.example.com", &verdict);

        assert!(persister.read_project("proj").unwrap().domains.contains(&"new.example.com".to_string()));
    }

    #[test]
    fn persist_verdict_writes_global_approval_to_global_file_not_project_file() {
        let sessions = Arc::new(SessionLists::new());
        let cache = Arc::new(AllowlistCache::new());
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let events = Arc::new(EventHub::new(16));
        let approver = DomainApprover::new(Duration::from_secs(30), sessions, cache, persister.clone(), events);

        let verdict = DomainVerdict::Approved { scope: Scope::Global, pattern: None };
        approver.persist_verdict("proj", "api.example.com", &verdict);

        assert!(persister.read_global().unwrap().domains.contains(&"api.example.com".to_string()));
        assert!(persister.read_project("proj").unwrap().domains.is_empty());
    }

    #[test]
    fn persist_verdict_is_a_no_op_for_session_scope() {
        let sessions = Arc::new(SessionLists::new());
        let cache = Arc::new(AllowlistCache::new());
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let events = Arc::new(EventHub::new(16));
        let approver = DomainApprover::new(Duration::from_secs(30), sessions, cache, persister.clone(), events);

        let verdict = DomainVerdict::Approved { scope: Scope::Session, pattern: None };
        approver.persist_verdict("proj", "new.example.com", &verdict);

        assert!(persister.read_project("proj").unwrap().domains.is_empty());
    }

    #[tokio::test]
    async fn request_publishes_added_then_removed_events() {
        let sessions = Arc::new(SessionLists::new());
        let cache = Arc::new(AllowlistCache::new());
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let events = Arc::new(EventHub::new(16));
        let approver = DomainApprover::new(Duration::from_millis(20), sessions, cache, persister, Arc::clone(&events));

        let mut rx = events.subscribe();
        let outcome = approver.request_approval("proj", "c1", "quiet.example.com:443", "tok").await;
        assert_eq!(outcome, Outcome::Deny);

        let added = rx.recv().await.unwrap();
        assert_eq!(added.name(), "domain-request-added");
        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.name(), "domain-request-removed");
    }
}

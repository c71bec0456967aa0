//! Process-wide allow/deny cache with RCU-style atomic swap on reload.

use std::{collections::HashMap, sync::Arc};

use crate::matcher::{Allowlist, Denylist};

/// Allow/deny pair for one project.
#[derive(Debug, Clone, Default)]
pub struct ProjectPolicy {
    pub allow: Allowlist,
    pub deny: Denylist,
}

/// Snapshot of the whole cache at a point in time. Readers hold this for the
/// lifetime of a single policy decision so a concurrent reload can never be
/// observed as a torn mix of old and new state.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    global_allow: Allowlist,
    global_deny: Denylist,
    per_project: HashMap<String, ProjectPolicy>,
}

impl CacheSnapshot {
    pub fn global_allow(&self) -> &Allowlist {
        &self.global_allow
    }

    pub fn global_deny(&self) -> &Denylist {
        &self.global_deny
    }

    pub fn project_allow(&self, project: &str) -> Option<&Allowlist> {
        self.per_project.get(project).map(|p| &p.allow)
    }

    pub fn project_deny(&self, project: &str) -> Option<&Denylist> {
        self.per_project.get(project).map(|p| &p.deny)
    }

    pub fn has_project_allow(&self, project: &str) -> bool {
        self.per_project
            .get(project)
            .is_some_and(|p| !p.allow.is_empty())
    }
}

/// `AllowlistCache` (C2). A single `arc_swap`-style pointer swap: readers
/// `snapshot()` an `Arc<CacheSnapshot>`, writers build a brand-new snapshot
/// and atomically replace the pointer. There is exactly one instance per
/// Guardian process.
pub struct AllowlistCache {
    inner: std::sync::RwLock<Arc<CacheSnapshot>>,
}

impl Default for AllowlistCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AllowlistCache {
    pub fn new() -> Self {
        Self {
            inner: std::sync::RwLock::new(Arc::new(CacheSnapshot::default())),
        }
    }

    /// Consistent read-only view usable across a single request's lifetime.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Atomic whole-entry replacement of the global allow/deny lists.
    pub fn set_global(&self, allow: Allowlist, deny: Denylist) {
        let current = self.snapshot();
        let mut next = (*current).clone();
        next.global_allow = allow;
        next.global_deny = deny;
        self.swap(next);
    }

    /// Atomic whole-entry replacement of one project's allow/deny lists.
    ///
    /// Per the resolver's override semantics (not additive), `allow` here is
    /// the project's *own* list; the policy resolver is responsible for
    /// treating a non-empty project allow as isolating from global allow.
    pub fn set_project(&self, name: impl Into<String>, allow: Allowlist, deny: Denylist) {
        let current = self.snapshot();
        let mut next = (*current).clone();
        next.per_project
            .insert(name.into(), ProjectPolicy { allow, deny });
        self.swap(next);
    }

    /// Replace the entire cache contents in one shot (used by the reload
    /// controller, which rebuilds everything from disk before swapping).
    pub fn replace_all(&self, global_allow: Allowlist, global_deny: Denylist, per_project: HashMap<String, ProjectPolicy>) {
        let next = CacheSnapshot {
            global_allow,
            global_deny,
            per_project,
        };
        self.swap(next);
    }

    fn swap(&self, next: CacheSnapshot) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
    }
}

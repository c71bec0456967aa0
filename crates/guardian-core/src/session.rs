//! Per-token in-memory allow/deny sets accumulated during a session.
//!
//! Purely in-memory; cleared on cloister stop (`clear`) or Guardian restart
//! (`clear_all`). Lookups ignore `:port`. Additions are idempotent.

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use crate::{
    error::{Error, Result},
    matcher::strip_port,
};

#[derive(Debug, Default)]
struct TokenState {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

/// Token-indexed session allow/deny sets (C3). A single `RwLock` over the
/// whole map is enough here: entries are small, updates are rare relative to
/// reads, and a read-heavy `RwLock` already lets concurrent `decide()` calls
/// proceed without blocking one another.
#[derive(Default)]
pub struct SessionLists {
    by_token: RwLock<HashMap<String, TokenState>>,
}

impl SessionLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_allow(&self, token: &str, host: &str) -> Result<()> {
        self.mutate(token, host, |state, host| {
            state.allow.insert(host);
        })
    }

    pub fn add_deny(&self, token: &str, host: &str) -> Result<()> {
        self.mutate(token, host, |state, host| {
            state.deny.insert(host);
        })
    }

    fn mutate(&self, token: &str, host: &str, f: impl FnOnce(&mut TokenState, String)) -> Result<()> {
        if token.is_empty() {
            return Err(Error::invalid("session list: empty token"));
        }
        let normalised = strip_port(host);
        if normalised.is_empty() {
            return Err(Error::invalid("session list: empty host"));
        }
        let mut guard = self.by_token.write().unwrap_or_else(|e| e.into_inner());
        let state = guard.entry(token.to_string()).or_default();
        f(state, normalised);
        Ok(())
    }

    pub fn is_allowed(&self, token: &str, host: &str) -> bool {
        let normalised = strip_port(host);
        let guard = self.by_token.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(token)
            .is_some_and(|state| state.allow.contains(&normalised))
    }

    pub fn is_blocked(&self, token: &str, host: &str) -> bool {
        let normalised = strip_port(host);
        let guard = self.by_token.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(token)
            .is_some_and(|state| state.deny.contains(&normalised))
    }

    /// Called on cloister stop.
    pub fn clear(&self, token: &str) {
        let mut guard = self.by_token.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(token);
    }

    /// Called on Guardian restart.
    pub fn clear_all(&self) {
        let mut guard = self.by_token.write().unwrap_or_else(|e| e.into_inner());
        guard.clear();
    }

    /// `(tokens, domains)` — number of distinct tokens tracked and total
    /// domain entries across both allow and deny sets.
    pub fn size(&self) -> (usize, usize) {
        let guard = self.by_token.read().unwrap_or_else(|e| e.into_inner());
        let domains = guard
            .values()
            .map(|s| s.allow.len() + s.deny.len())
            .sum();
        (guard.len(), domains)
    }
}

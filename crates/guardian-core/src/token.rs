//! Token registry (C4): proxy token -> {cloister, project, worktree path}.
//!
//! One JSON file per token under the token directory, written atomically
//! (temp file + rename) with owner-only permissions, mirroring the
//! file-backed store pattern used elsewhere in this codebase for small
//! record sets that must survive a process restart.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    session::SessionLists,
};

/// `{token, cloister_name, project_name, worktree_path}`. `project_name` is
/// empty only for a "project-less" cloister.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TokenBinding {
    pub cloister_name: String,
    #[serde(default)]
    pub project_name: String,
    pub worktree_path: String,
}

impl TokenBinding {
    pub fn has_project(&self) -> bool {
        !self.project_name.is_empty()
    }
}

/// Generate a 64-hex-character token from 32 cryptographically random bytes.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct TokenRegistry {
    dir: PathBuf,
    bindings: RwLock<HashMap<String, TokenBinding>>,
    sessions: Arc<SessionLists>,
}

impl TokenRegistry {
    /// `sessions` gives revoke (C4) a handle on session state (C3) so a
    /// revoked token's allow/deny entries don't outlive the token itself.
    pub fn new(dir: impl Into<PathBuf>, sessions: Arc<SessionLists>) -> Self {
        Self {
            dir: dir.into(),
            bindings: RwLock::new(HashMap::new()),
            sessions,
        }
    }

    /// Register a new binding. Must be durable on disk before returning
    /// success, so a crash immediately after registration cannot orphan a
    /// running cloister.
    pub fn register(&self, token: &str, binding: TokenBinding) -> Result<()> {
        if token.is_empty() {
            return Err(Error::invalid("token registry: empty token"));
        }
        {
            let guard = self.bindings.read().unwrap_or_else(|e| e.into_inner());
            if guard.contains_key(token) {
                return Err(Error::invalid(format!("token already registered: {token}")));
            }
        }
        self.write_to_disk(token, &binding)?;
        let mut guard = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(token.to_string(), binding);
        Ok(())
    }

    pub fn lookup(&self, token: &str) -> Option<TokenBinding> {
        let guard = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        guard.get(token).cloned()
    }

    /// Distinct project names across every currently-registered binding,
    /// for handing to the reload controller (C10) so it knows which
    /// project decision files to rebuild a cache entry from.
    pub fn known_projects(&self) -> Vec<String> {
        let guard = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        let mut projects: Vec<String> = guard
            .values()
            .filter(|b| b.has_project())
            .map(|b| b.project_name.clone())
            .collect();
        projects.sort();
        projects.dedup();
        projects
    }

    /// Remove from memory and disk, and clear any C3 session state held for
    /// the token. No-op (not an error) if already absent.
    pub fn revoke(&self, token: &str) -> Result<()> {
        let mut guard = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(token);
        drop(guard);
        self.sessions.clear(token);
        let path = self.path_for(token);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort reload of every persisted binding, matching in-memory state
    /// to what's currently on disk. Unreadable or malformed entries are
    /// skipped with a warning rather than aborting. Any binding whose backing
    /// file has disappeared since the last load (for example, a token
    /// revoked by deleting its file directly) is dropped from memory and has
    /// its C3 session state cleared — this is Guardian's only trigger path
    /// for observing an out-of-process revocation.
    pub fn load_from_disk(&self) -> Result<()> {
        let mut fresh: HashMap<String, TokenBinding> = HashMap::new();
        if self.dir.exists() {
            for entry in std::fs::read_dir(&self.dir)? {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(error = %e, "token registry: failed to read directory entry");
                        continue;
                    },
                };
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let token = match path.file_stem().and_then(|s| s.to_str()) {
                    Some(t) => t.to_string(),
                    None => continue,
                };
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match serde_json::from_str::<TokenBinding>(&contents) {
                        Ok(binding) => {
                            fresh.insert(token, binding);
                        },
                        Err(e) => {
                            tracing::warn!(token = %token, error = %e, "token registry: skipping malformed binding");
                        },
                    },
                    Err(e) => {
                        tracing::warn!(token = %token, error = %e, "token registry: failed to read binding file");
                    },
                }
            }
        }
        let mut guard = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        let stale: Vec<String> = guard.keys().filter(|t| !fresh.contains_key(*t)).cloned().collect();
        *guard = fresh;
        drop(guard);
        for token in stale {
            self.sessions.clear(&token);
        }
        Ok(())
    }

    fn path_for(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{token}.json"))
    }

    fn write_to_disk(&self, token: &str, binding: &TokenBinding) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        set_dir_owner_only(&self.dir)?;
        let contents = serde_json::to_string_pretty(binding)?;
        let final_path = self.path_for(token);
        let tmp_path = self.dir.join(format!("{token}.json.tmp"));
        std::fs::write(&tmp_path, contents)?;
        set_file_owner_only(&tmp_path)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_file_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_dir_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(cloister: &str) -> TokenBinding {
        TokenBinding {
            cloister_name: cloister.to_string(),
            project_name: "proj".to_string(),
            worktree_path: "/tmp/proj".to_string(),
        }
    }

    fn registry(dir: &Path) -> TokenRegistry {
        TokenRegistry::new(dir, Arc::new(SessionLists::new()))
    }

    #[test]
    fn generate_token_is_64_lowercase_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn generate_token_is_not_constant() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.register("tok1", binding("c1")).unwrap();
        let found = registry.lookup("tok1").unwrap();
        assert_eq!(found.cloister_name, "c1");
    }

    #[test]
    fn register_rejects_duplicate_token() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.register("tok1", binding("c1")).unwrap();
        assert!(registry.register("tok1", binding("c2")).is_err());
    }

    #[test]
    fn register_rejects_empty_token() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(registry.register("", binding("c1")).is_err());
    }

    #[test]
    fn revoke_removes_from_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.register("tok1", binding("c1")).unwrap();
        registry.revoke("tok1").unwrap();
        assert!(registry.lookup("tok1").is_none());
        assert!(!dir.path().join("tok1.json").exists());
    }

    #[test]
    fn revoke_unknown_token_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(registry.revoke("does-not-exist").is_ok());
    }

    #[test]
    fn revoke_clears_session_state_for_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionLists::new());
        let registry = TokenRegistry::new(dir.path(), Arc::clone(&sessions));
        registry.register("tok1", binding("c1")).unwrap();
        sessions.add_allow("tok1", "a.com").unwrap();
        sessions.add_allow("tok2", "b.com").unwrap();

        registry.revoke("tok1").unwrap();

        assert!(!sessions.is_allowed("tok1", "a.com"));
        assert!(sessions.is_allowed("tok2", "b.com"));
    }

    #[test]
    fn load_from_disk_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = registry(dir.path());
            registry.register("tok1", binding("c1")).unwrap();
        }
        let registry = registry(dir.path());
        registry.load_from_disk().unwrap();
        assert_eq!(registry.lookup("tok1").unwrap().cloister_name, "c1");
    }

    #[test]
    fn load_from_disk_evicts_bindings_whose_file_was_deleted_and_clears_their_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionLists::new());
        let registry = TokenRegistry::new(dir.path(), Arc::clone(&sessions));
        registry.register("tok1", binding("c1")).unwrap();
        registry.register("tok2", binding("c2")).unwrap();
        sessions.add_allow("tok1", "a.com").unwrap();
        sessions.add_allow("tok2", "b.com").unwrap();

        std::fs::remove_file(dir.path().join("tok1.json")).unwrap();
        registry.load_from_disk().unwrap();

        assert!(registry.lookup("tok1").is_none());
        assert!(registry.lookup("tok2").is_some());
        assert!(!sessions.is_allowed("tok1", "a.com"));
        assert!(sessions.is_allowed("tok2", "b.com"));
    }

    #[test]
    fn known_projects_is_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.register("tok1", binding("c1")).unwrap();
        registry.register("tok2", binding("c2")).unwrap();
        registry
            .register(
                "tok3",
                TokenBinding {
                    cloister_name: "c3".to_string(),
                    project_name: String::new(),
                    worktree_path: "/tmp/c3".to_string(),
                },
            )
            .unwrap();
        assert_eq!(registry.known_projects(), vec!["proj".to_string()]);
    }

    #[test]
    fn load_from_disk_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let registry = registry(dir.path());
        assert!(registry.load_from_disk().is_ok());
        assert!(registry.lookup("bad").is_none());
    }
}

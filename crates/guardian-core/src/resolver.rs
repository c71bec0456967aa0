//! Policy resolver (C8): the single `decide()` procedure combining C1–C3
//! under the precedence rules in order. Performs no token lookup of its own —
//! callers resolve the token exactly once (C4) and thread the binding
//! through, per the "exactly one lookup per request" design note.

use crate::{
    cache::CacheSnapshot,
    matcher::strip_port,
    session::SessionLists,
    token::TokenBinding,
    types::Outcome,
};

/// Resolution order (first match wins):
/// 1. empty host -> Deny
/// 2. unknown token (no binding) -> Deny
/// 3. session deny -> Deny
/// 4. global deny -> Deny
/// 5. project deny -> Deny
/// 6. session allow -> Allow
/// 7. project allow -> Allow
/// 8. global allow, only if the project has no allow list of its own -> Allow
/// 9. otherwise -> AskHuman
pub fn decide(
    token: &str,
    binding: Option<&TokenBinding>,
    host: &str,
    sessions: &SessionLists,
    snapshot: &CacheSnapshot,
) -> Outcome {
    if strip_port(host).is_empty() {
        return Outcome::Deny;
    }
    let Some(binding) = binding else {
        return Outcome::Deny;
    };

    if sessions.is_blocked(token, host) {
        return Outcome::Deny;
    }
    if snapshot.global_deny().is_allowed(host) {
        return Outcome::Deny;
    }
    if binding.has_project() {
        if let Some(deny) = snapshot.project_deny(&binding.project_name) {
            if deny.is_allowed(host) {
                return Outcome::Deny;
            }
        }
    }

    if sessions.is_allowed(token, host) {
        return Outcome::Allow;
    }

    if binding.has_project() {
        if let Some(allow) = snapshot.project_allow(&binding.project_name) {
            if allow.is_allowed(host) {
                return Outcome::Allow;
            }
        }
        // A project with its own allow list is isolating, not additive:
        // global allow only applies when the project has no list at all.
        if !snapshot.has_project_allow(&binding.project_name) && snapshot.global_allow().is_allowed(host) {
            return Outcome::Allow;
        }
    } else if snapshot.global_allow().is_allowed(host) {
        return Outcome::Allow;
    }

    Outcome::AskHuman
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{AllowlistCache, ProjectPolicy},
        matcher::{Allowlist, Denylist},
    };

    fn binding(project: &str) -> TokenBinding {
        TokenBinding {
            cloister_name: "c1".into(),
            project_name: project.into(),
            worktree_path: "/tmp/c1".into(),
        }
    }

    #[test]
    fn unknown_token_always_denies() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        let snap = cache.snapshot();
        assert_eq!(
            decide("tok", None, "example.com", &sessions, &snap),
            Outcome::Deny
        );
    }

    #[test]
    fn empty_host_always_denies() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        let snap = cache.snapshot();
        let b = binding("p");
        assert_eq!(decide("tok", Some(&b), ":443", &sessions, &snap), Outcome::Deny);
    }

    #[test]
    fn session_deny_short_circuits_every_allow() {
        let sessions = SessionLists::new();
        sessions.add_deny("tok", "a.com").unwrap();
        let cache = AllowlistCache::new();
        cache.set_global(Allowlist::from_domains(["a.com"]), Denylist::empty());
        let snap = cache.snapshot();
        let b = binding("p");
        assert_eq!(decide("tok", Some(&b), "a.com", &sessions, &snap), Outcome::Deny);
    }

    #[test]
    fn global_deny_beats_global_allow() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        cache.set_global(
            Allowlist::from_domains(["api.evil.com"]),
            Denylist::from_domains_and_patterns(Vec::<String>::new(), ["*.evil.com"]),
        );
        let snap = cache.snapshot();
        let b = binding("p");
        assert_eq!(decide("tok", Some(&b), "api.evil.com", &sessions, &snap), Outcome::Deny);
    }

    #[test]
    fn project_allow_is_isolating_not_additive() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        cache.set_global(Allowlist::from_domains(["a.com", "b.com"]), Denylist::empty());
        cache.set_project("P", Allowlist::from_domains(["a.com"]), Denylist::empty());
        let snap = cache.snapshot();

        let t1 = binding("P");
        assert_eq!(decide("t1", Some(&t1), "b.com", &sessions, &snap), Outcome::AskHuman);

        let t2 = binding("Q");
        assert_eq!(decide("t2", Some(&t2), "b.com", &sessions, &snap), Outcome::Allow);
    }

    #[test]
    fn project_without_allow_list_falls_back_to_global() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        cache.set_global(Allowlist::from_domains(["a.com"]), Denylist::empty());
        let snap = cache.snapshot();
        let b = binding("P");
        assert_eq!(decide("tok", Some(&b), "a.com", &sessions, &snap), Outcome::Allow);
    }

    #[test]
    fn project_deny_beats_project_allow_and_global() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        cache.set_global(Allowlist::from_domains(["a.com"]), Denylist::empty());
        cache.set_project(
            "P",
            Allowlist::from_domains(["a.com"]),
            Denylist::from_domains(["a.com"]),
        );
        let snap = cache.snapshot();
        let b = binding("P");
        assert_eq!(decide("tok", Some(&b), "a.com", &sessions, &snap), Outcome::Deny);
    }

    #[test]
    fn unlisted_host_asks_human() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        let snap = cache.snapshot();
        let b = binding("P");
        assert_eq!(
            decide("tok", Some(&b), "new.example.com", &sessions, &snap),
            Outcome::AskHuman
        );
    }

    #[test]
    fn session_allow_unblocks_without_global_or_project_list() {
        let sessions = SessionLists::new();
        sessions.add_allow("tok", "new.example.com").unwrap();
        let cache = AllowlistCache::new();
        let snap = cache.snapshot();
        let b = binding("P");
        assert_eq!(
            decide("tok", Some(&b), "new.example.com", &sessions, &snap),
            Outcome::Allow
        );
    }

    #[test]
    fn session_allow_is_isolated_per_token() {
        let sessions = SessionLists::new();
        sessions.add_allow("tok-a", "new.example.com").unwrap();
        let cache = AllowlistCache::new();
        let snap = cache.snapshot();
        let b = binding("P");
        assert_eq!(
            decide("tok-b", Some(&b), "new.example.com", &sessions, &snap),
            Outcome::AskHuman
        );
    }

    #[test]
    fn project_allow_with_own_projectpolicy_default_deny_is_still_consulted() {
        let sessions = SessionLists::new();
        let cache = AllowlistCache::new();
        let _ = ProjectPolicy::default();
        let snap = cache.snapshot();
        let b = binding("P");
        assert_eq!(
            decide("tok", Some(&b), "anything.com", &sessions, &snap),
            Outcome::AskHuman
        );
    }
}

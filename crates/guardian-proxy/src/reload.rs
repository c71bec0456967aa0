//! Reload controller (C10): on an external trigger, rebuilds the allowlist
//! cache from baseline config and every decision file, then swaps it in.
//! Never touches session lists or the token registry.

use std::{collections::HashMap, sync::Arc};

use guardian_core::{
    cache::{AllowlistCache, ProjectPolicy},
    config::GuardianConfig,
    decision::DecisionPersister,
    matcher::{Allowlist, Denylist},
};
use tracing::{info, warn};

/// Rebuilds `AllowlistCache` from disk on demand. Project membership is
/// tracked by whoever registers tokens (the known project-name set changes
/// only when a cloister starts or stops); the reload controller is handed
/// the current set each time rather than scanning the token registry itself,
/// keeping it decoupled from C4.
pub struct ReloadController {
    config: Arc<GuardianConfig>,
    persister: Arc<DecisionPersister>,
    cache: Arc<AllowlistCache>,
}

impl ReloadController {
    pub fn new(config: Arc<GuardianConfig>, persister: Arc<DecisionPersister>, cache: Arc<AllowlistCache>) -> Self {
        Self { config, persister, cache }
    }

    /// Re-read baseline config and every decision file, build a fresh cache,
    /// and swap it in atomically. On any I/O/parse failure the previous
    /// cache is left untouched.
    pub fn reload(&self, known_projects: &[String]) {
        match self.try_reload(known_projects) {
            Ok(()) => info!(projects = known_projects.len(), "reload: cache rebuilt"),
            Err(e) => warn!(error = %e, "reload: failed, keeping previous cache"),
        }
    }

    fn try_reload(&self, known_projects: &[String]) -> guardian_core::Result<()> {
        let global_file = self.persister.read_global()?;

        let mut global_domains = self.config.allowed_domains.clone();
        global_domains.extend(global_file.domains.iter().cloned());
        let mut global_patterns = self.config.allowed_patterns.clone();
        global_patterns.extend(global_file.patterns.iter().cloned());

        let global_allow = Allowlist::from_domains_and_patterns(global_domains, global_patterns);
        let global_deny = Denylist::from_domains_and_patterns(global_file.denied_domains, global_file.denied_patterns);

        let mut per_project = HashMap::new();
        for project in known_projects {
            let file = self.persister.read_project(project)?;
            per_project.insert(
                project.clone(),
                ProjectPolicy {
                    allow: Allowlist::from_domains_and_patterns(file.domains, file.patterns),
                    deny: Denylist::from_domains_and_patterns(file.denied_domains, file.denied_patterns),
                },
            );
        }

        self.cache.replace_all(global_allow, global_deny, per_project);
        Ok(())
    }
}

/// Bridges `DecisionPersister`'s per-write notification (C11) back to a
/// `ReloadController` without C11 depending on it directly — the notifier
/// re-runs a full reload using the project set supplied at construction.
pub struct ControllerNotifier {
    controller: Arc<ReloadController>,
    known_projects: std::sync::Mutex<Vec<String>>,
}

impl ControllerNotifier {
    pub fn new(controller: Arc<ReloadController>) -> Self {
        Self {
            controller,
            known_projects: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn set_known_projects(&self, projects: Vec<String>) {
        *self.known_projects.lock().unwrap_or_else(|e| e.into_inner()) = projects;
    }
}

impl guardian_core::decision::ReloadNotifier for ControllerNotifier {
    fn notify(&self) {
        let projects = self.known_projects.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.controller.reload(&projects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<GuardianConfig> {
        Arc::new(GuardianConfig::load(None).unwrap())
    }

    #[test]
    fn reload_merges_baseline_and_global_decision_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AllowlistCache::new());
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        persister.add_domain_to_global("api.example.com").unwrap();

        let controller = ReloadController::new(config(), persister, Arc::clone(&cache));
        controller.reload(&[]);

        let snap = cache.snapshot();
        assert!(snap.global_allow().is_allowed("api.example.com"));
    }

    #[test]
    fn reload_builds_one_entry_per_known_project() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AllowlistCache::new());
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        persister.add_domain_to_project("alpha", "alpha.example.com").unwrap();

        let controller = ReloadController::new(config(), persister, Arc::clone(&cache));
        controller.reload(&["alpha".to_string(), "beta".to_string()]);

        let snap = cache.snapshot();
        assert!(snap.project_allow("alpha").unwrap().is_allowed("alpha.example.com"));
        assert!(!snap.project_allow("beta").unwrap().is_allowed("alpha.example.com"));
    }

    #[test]
    fn reload_is_a_no_op_on_unreadable_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AllowlistCache::new());
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        cache.set_global(Allowlist::from_domains(["stale.com"]), Denylist::empty());

        // Malformed YAML with an unknown key fails strict parsing.
        std::fs::write(persister.project_path("broken"), "bogus_key: true\n").unwrap();

        let controller = ReloadController::new(config(), persister, Arc::clone(&cache));
        controller.reload(&["broken".to_string()]);

        let snap = cache.snapshot();
        assert!(snap.global_allow().is_allowed("stale.com"));
    }

    #[tokio::test]
    async fn controller_notifier_triggers_reload_with_tracked_projects() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AllowlistCache::new());
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let controller = Arc::new(ReloadController::new(config(), Arc::clone(&persister), Arc::clone(&cache)));
        let notifier: Arc<dyn guardian_core::decision::ReloadNotifier> = {
            let n = Arc::new(ControllerNotifier::new(Arc::clone(&controller)));
            n.set_known_projects(vec!["proj".to_string()]);
            n
        };

        let persister2 = Arc::new(DecisionPersister::new(dir.path(), notifier));
        persister2.add_domain_to_project("proj", "new.example.com").unwrap();

        let snap = cache.snapshot();
        assert!(snap.project_allow("proj").unwrap().is_allowed("new.example.com"));
    }
}

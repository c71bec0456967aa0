//! Decision persister (C11): appends approved/denied domains & patterns to
//! project/global decision files. Written atomically (temp file + rename)
//! with owner-only permissions; parsed strictly so a stray key in a
//! hand-edited file fails loudly instead of being silently dropped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Semantic shape of one decision file (global, or one per project).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DecisionFile {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub denied_domains: Vec<String>,
    #[serde(default)]
    pub denied_patterns: Vec<String>,
}

/// Invoked after a successful write so the reload path (C10) can rebuild the
/// in-memory cache. The persister itself never touches `AllowlistCache`
/// directly — that would couple C11 to C2 without the swap-on-reload
/// indirection the concurrency model relies on.
pub trait ReloadNotifier: Send + Sync {
    fn notify(&self);
}

pub struct NoopReloadNotifier;

impl ReloadNotifier for NoopReloadNotifier {
    fn notify(&self) {}
}

pub struct DecisionPersister {
    dir: PathBuf,
    notifier: std::sync::Arc<dyn ReloadNotifier>,
}

impl DecisionPersister {
    pub fn new(dir: impl Into<PathBuf>, notifier: std::sync::Arc<dyn ReloadNotifier>) -> Self {
        Self {
            dir: dir.into(),
            notifier,
        }
    }

    pub fn global_path(&self) -> PathBuf {
        self.dir.join("global.yaml")
    }

    pub fn project_path(&self, project: &str) -> PathBuf {
        self.dir.join(format!("project-{project}.yaml"))
    }

    pub fn read_global(&self) -> Result<DecisionFile> {
        read_decision_file(&self.global_path())
    }

    pub fn read_project(&self, project: &str) -> Result<DecisionFile> {
        read_decision_file(&self.project_path(project))
    }

    pub fn add_domain_to_global(&self, domain: &str) -> Result<()> {
        self.mutate(&self.global_path(), |f| insert_unique(&mut f.domains, domain))
    }

    pub fn add_pattern_to_global(&self, pattern: &str) -> Result<()> {
        self.mutate(&self.global_path(), |f| insert_unique(&mut f.patterns, pattern))
    }

    pub fn add_denied_domain_to_global(&self, domain: &str) -> Result<()> {
        self.mutate(&self.global_path(), |f| insert_unique(&mut f.denied_domains, domain))
    }

    pub fn add_denied_pattern_to_global(&self, pattern: &str) -> Result<()> {
        self.mutate(&self.global_path(), |f| insert_unique(&mut f.denied_patterns, pattern))
    }

    pub fn add_domain_to_project(&self, project: &str, domain: &str) -> Result<()> {
        self.mutate(&self.project_path(project), |f| insert_unique(&mut f.domains, domain))
    }

    pub fn add_pattern_to_project(&self, project: &str, pattern: &str) -> Result<()> {
        self.mutate(&self.project_path(project), |f| insert_unique(&mut f.patterns, pattern))
    }

    pub fn add_denied_domain_to_project(&self, project: &str, domain: &str) -> Result<()> {
        self.mutate(&self.project_path(project), |f| {
            insert_unique(&mut f.denied_domains, domain)
        })
    }

    pub fn add_denied_pattern_to_project(&self, project: &str, pattern: &str) -> Result<()> {
        self.mutate(&self.project_path(project), |f| {
            insert_unique(&mut f.denied_patterns, pattern)
        })
    }

    fn mutate(&self, path: &Path, f: impl FnOnce(&mut DecisionFile) -> bool) -> Result<()> {
        let mut file = read_decision_file(path)?;
        let changed = f(&mut file);
        if changed {
            write_decision_file(path, &file)?;
            self.notifier.notify();
        }
        Ok(())
    }
}

fn insert_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

fn read_decision_file(path: &Path) -> Result<DecisionFile> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_yaml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DecisionFile::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_decision_file(path: &Path, file: &DecisionFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        set_dir_owner_only(parent)?;
    }
    let contents = serde_yaml::to_string(file)?;
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, contents)?;
    set_file_owner_only(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
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

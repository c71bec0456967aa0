//! Baseline Guardian configuration: a `Default` struct overlaid by an
//! optional on-disk YAML file, overlaid by environment variables, validated
//! once at startup into an immutable `GuardianConfig`.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Result;

const ENV_DECISIONS_DIR: &str = "CLOISTER_DECISIONS_DIR";
const ENV_TOKEN_DIR: &str = "CLOISTER_TOKEN_DIR";
const ENV_CONFIG_DIR: &str = "CLOISTER_CONFIG_DIR";

/// On-disk baseline config (YAML). Any field left absent falls back to the
/// compiled-in default; unknown keys are a hard error so a typo in a
/// hand-edited file is never silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RawConfig {
    pub proxy_bind: String,
    pub proxy_port: u16,
    pub ui_bind: String,
    pub ui_port: u16,
    pub allowed_domains: Vec<String>,
    pub allowed_patterns: Vec<String>,
    pub command_approval_timeout_secs: u64,
    pub domain_approval_timeout_secs: u64,
    pub upstream_dial_timeout_secs: u64,
    pub idle_splice_timeout_secs: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            proxy_bind: "0.0.0.0".to_string(),
            proxy_port: crate::types::DEFAULT_PROXY_PORT,
            ui_bind: "127.0.0.1".to_string(),
            ui_port: 4180,
            allowed_domains: Vec::new(),
            allowed_patterns: Vec::new(),
            command_approval_timeout_secs: 120,
            domain_approval_timeout_secs: 60,
            upstream_dial_timeout_secs: 30,
            idle_splice_timeout_secs: 300,
        }
    }
}

/// Validated, immutable in-memory form consumed by the rest of the core.
#[derive(Debug, Clone)]
pub struct GuardianConfig {
    pub proxy_bind: String,
    pub proxy_port: u16,
    pub ui_bind: String,
    pub ui_port: u16,
    pub allowed_domains: Vec<String>,
    pub allowed_patterns: Vec<String>,
    pub command_approval_timeout: Duration,
    pub domain_approval_timeout: Duration,
    pub upstream_dial_timeout: Duration,
    pub idle_splice_timeout: Duration,
    pub decisions_dir: PathBuf,
    pub token_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl GuardianConfig {
    /// Load the baseline config file (if present) from `config_dir`, apply
    /// environment overrides, and validate into a `GuardianConfig`.
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "cloister");

        let config_dir = std::env::var(ENV_CONFIG_DIR).map(PathBuf::from).unwrap_or_else(|_| {
            dirs.as_ref()
                .map(|d| d.config_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".cloister/config"))
        });
        let decisions_dir = std::env::var(ENV_DECISIONS_DIR).map(PathBuf::from).unwrap_or_else(|_| {
            dirs.as_ref()
                .map(|d| d.data_dir().join("decisions"))
                .unwrap_or_else(|| PathBuf::from(".cloister/decisions"))
        });
        let token_dir = std::env::var(ENV_TOKEN_DIR).map(PathBuf::from).unwrap_or_else(|_| {
            dirs.as_ref()
                .map(|d| d.data_dir().join("tokens"))
                .unwrap_or_else(|| PathBuf::from(".cloister/tokens"))
        });

        let default_path = config_path.map(PathBuf::from).unwrap_or_else(|| config_dir.join("guardian.yaml"));
        let raw = match std::fs::read_to_string(&default_path) {
            Ok(contents) => serde_yaml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RawConfig::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            proxy_bind: raw.proxy_bind,
            proxy_port: raw.proxy_port,
            ui_bind: raw.ui_bind,
            ui_port: raw.ui_port,
            allowed_domains: raw.allowed_domains,
            allowed_patterns: raw.allowed_patterns,
            command_approval_timeout: Duration::from_secs(raw.command_approval_timeout_secs),
            domain_approval_timeout: Duration::from_secs(raw.domain_approval_timeout_secs),
            upstream_dial_timeout: Duration::from_secs(raw.upstream_dial_timeout_secs),
            idle_splice_timeout: Duration::from_secs(raw.idle_splice_timeout_secs),
            decisions_dir,
            token_dir,
            config_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_raw_config_matches_spec_defaults() {
        let raw = RawConfig::default();
        assert_eq!(raw.proxy_port, 3128);
        assert_eq!(raw.domain_approval_timeout_secs, 60);
        assert_eq!(raw.upstream_dial_timeout_secs, 30);
    }

    #[test]
    fn unknown_key_in_raw_config_is_rejected() {
        let yaml = "proxy_port: 3128\nbogus_field: true\n";
        assert!(serde_yaml::from_str::<RawConfig>(yaml).is_err());
    }

    #[test]
    fn load_with_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.yaml");
        let cfg = GuardianConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.proxy_port, 3128);
    }

    #[test]
    fn load_reads_present_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.yaml");
        std::fs::write(&path, "proxy_port: 9999\nallowed_domains: [a.com]\n").unwrap();
        let cfg = GuardianConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.proxy_port, 9999);
        assert_eq!(cfg.allowed_domains, vec!["a.com".to_string()]);
    }
}

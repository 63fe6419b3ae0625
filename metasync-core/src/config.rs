//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, `~/.metasync/config.yaml`,
//! `<project>/.metasync/settings.yaml`. The result is an immutable
//! [`SyncConfig`] snapshot handed to each operation.
//!
//! Every loader has two forms, mirroring the rest of the crate:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ProjectError};
use crate::project::ProjectSettings;

pub const DEFAULT_API_VERSION: &str = "58.0";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_TOOLING_TIMEOUT: Duration = Duration::from_secs(120);

/// User-global defaults from `~/.metasync/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooling_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_conflicts_before_compile: Option<bool>,
}

/// `<home>/.metasync/config.yaml`: pure, no I/O.
pub fn global_config_path_at(home: &Path) -> PathBuf {
    home.join(".metasync").join("config.yaml")
}

/// Load the global config. A missing file yields the defaults.
pub fn load_global_config_at(home: &Path) -> Result<GlobalConfig, ProjectError> {
    let path = global_config_path_at(home);
    if !path.exists() {
        return Ok(GlobalConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| ProjectError::Parse { path, source })
}

/// `load_global_config_at` convenience wrapper.
pub fn load_global_config() -> Result<GlobalConfig, ProjectError> {
    let home = dirs::home_dir().ok_or(ProjectError::HomeNotFound)?;
    load_global_config_at(&home)
}

/// Immutable per-operation configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub api_version: String,
    pub poll_interval: Duration,
    pub deploy_timeout: Duration,
    pub tooling_timeout: Duration,
    pub check_conflicts_before_compile: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_owned(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
            tooling_timeout: DEFAULT_TOOLING_TIMEOUT,
            check_conflicts_before_compile: true,
        }
    }
}

impl SyncConfig {
    /// Layer global config and project settings over the defaults.
    pub fn resolve(global: &GlobalConfig, project: &ProjectSettings) -> Self {
        let defaults = Self::default();
        let secs = |project: Option<u64>, global: Option<u64>, default: Duration| {
            project
                .or(global)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        Self {
            api_version: project
                .api_version
                .clone()
                .or_else(|| global.api_version.clone())
                .unwrap_or(defaults.api_version),
            poll_interval: secs(
                project.poll_interval_secs,
                global.poll_interval_secs,
                defaults.poll_interval,
            ),
            deploy_timeout: secs(
                project.deploy_timeout_secs,
                global.deploy_timeout_secs,
                defaults.deploy_timeout,
            ),
            tooling_timeout: secs(
                project.tooling_timeout_secs,
                global.tooling_timeout_secs,
                defaults.tooling_timeout,
            ),
            check_conflicts_before_compile: project
                .check_conflicts_before_compile
                .or(global.check_conflicts_before_compile)
                .unwrap_or(defaults.check_conflicts_before_compile),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_global_config_is_default() {
        let home = TempDir::new().unwrap();
        let cfg = load_global_config_at(home.path()).unwrap();
        assert_eq!(cfg, GlobalConfig::default());
    }

    #[test]
    fn project_settings_override_global() {
        let home = TempDir::new().unwrap();
        let path = global_config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "api_version: \"57.0\"\npoll_interval_secs: 5\ndeploy_timeout_secs: 30\n").unwrap();
        let global = load_global_config_at(home.path()).unwrap();

        let project = ProjectSettings {
            deploy_timeout_secs: Some(90),
            ..ProjectSettings::new("demo", "https://example.my.salesforce.com")
        };
        let cfg = SyncConfig::resolve(&global, &project);
        assert_eq!(cfg.api_version, "57.0");
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.deploy_timeout, Duration::from_secs(90));
        assert_eq!(cfg.tooling_timeout, DEFAULT_TOOLING_TIMEOUT);
        assert!(cfg.check_conflicts_before_compile);
    }

    #[test]
    fn corrupt_global_config_reports_path() {
        let home = TempDir::new().unwrap();
        let path = global_config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "- not: [a mapping").unwrap();
        let err = load_global_config_at(home.path()).unwrap_err();
        assert!(err.to_string().contains("config.yaml"), "got: {err}");
    }
}

//! Project layout and settings persistence.
//!
//! # Storage layout
//!
//! ```text
//! <project>/
//!   src/                    source root (package layout)
//!     package.xml           project manifest
//!   .metasync/
//!     settings.yaml         project settings (mode 0600)
//!     connections.yaml      org connection targets (mode 0600)
//!     local_store.json      local index
//!     describe.json         cached describe response
//! ```
//!
//! Writes follow the same flow everywhere: serialize → `.tmp` sibling →
//! `chmod 0600` → `rename`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{DescribedType, TypeCatalog};
use crate::error::{io_err, ProjectError};
use crate::manifest::PackageManifest;

pub const METASYNC_DIR: &str = ".metasync";
pub const SOURCE_DIR: &str = "src";
pub const MANIFEST_FILE: &str = "package.xml";
pub const SETTINGS_FILE: &str = "settings.yaml";
pub const CONNECTIONS_FILE: &str = "connections.yaml";
pub const LOCAL_STORE_FILE: &str = "local_store.json";
pub const DESCRIBE_CACHE_FILE: &str = "describe.json";

/// Environment variable overriding the stored access token.
pub const ACCESS_TOKEN_ENV: &str = "METASYNC_ACCESS_TOKEN";

/// `<project>/.metasync/settings.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub instance_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
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

impl ProjectSettings {
    pub fn new(name: impl Into<String>, instance_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_url: instance_url.into(),
            username: None,
            access_token: None,
            api_version: None,
            poll_interval_secs: None,
            deploy_timeout_secs: None,
            tooling_timeout_secs: None,
            check_conflicts_before_compile: None,
        }
    }

    /// Stored token, overridden by `METASYNC_ACCESS_TOKEN` when set.
    pub fn effective_access_token(&self) -> Option<String> {
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.access_token.clone())
    }
}

/// An opened project: its root directory plus loaded settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub root: PathBuf,
    pub settings: ProjectSettings,
}

impl Project {
    /// Open the project rooted at `root`.
    ///
    /// Returns `ProjectError::NotAProject` if the settings file is absent,
    /// `ProjectError::Parse` (with path) if it is malformed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let root = root.into();
        let path = settings_path_at(&root);
        if !path.exists() {
            return Err(ProjectError::NotAProject { path });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let settings =
            serde_yaml::from_str(&contents).map_err(|source| ProjectError::Parse { path, source })?;
        Ok(Self { root, settings })
    }

    /// Walk up from `start` to the nearest directory holding `.metasync/settings.yaml`.
    pub fn discover(start: &Path) -> Result<Self, ProjectError> {
        let mut cursor = Some(start);
        while let Some(dir) = cursor {
            if settings_path_at(dir).exists() {
                return Self::open(dir);
            }
            cursor = dir.parent();
        }
        Err(ProjectError::NotAProject {
            path: settings_path_at(start),
        })
    }

    pub fn source_root(&self) -> PathBuf {
        self.root.join(SOURCE_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.source_root().join(MANIFEST_FILE)
    }

    pub fn metasync_dir(&self) -> PathBuf {
        self.root.join(METASYNC_DIR)
    }

    pub fn settings_path(&self) -> PathBuf {
        settings_path_at(&self.root)
    }

    pub fn connections_path(&self) -> PathBuf {
        self.metasync_dir().join(CONNECTIONS_FILE)
    }

    pub fn local_store_path(&self) -> PathBuf {
        self.metasync_dir().join(LOCAL_STORE_FILE)
    }

    pub fn describe_cache_path(&self) -> PathBuf {
        self.metasync_dir().join(DESCRIBE_CACHE_FILE)
    }

    /// Load `src/package.xml`; an absent manifest is an empty one.
    pub fn load_manifest(&self) -> Result<PackageManifest, ProjectError> {
        let path = self.manifest_path();
        if !path.exists() {
            let version = self.settings.api_version.clone();
            return Ok(match version {
                Some(v) => PackageManifest::with_version(v),
                None => PackageManifest::new(),
            });
        }
        Ok(PackageManifest::load(&path)?)
    }

    pub fn save_manifest(&self, manifest: &PackageManifest) -> Result<(), ProjectError> {
        Ok(manifest.save(&self.manifest_path())?)
    }

    /// Persist settings atomically with mode 0600 (may carry a token).
    pub fn save_settings(&self) -> Result<(), ProjectError> {
        write_private_yaml(&self.settings_path(), &self.settings)
    }

    /// The built-in catalog, overridden by a cached describe response if any.
    pub fn load_catalog(&self) -> Result<TypeCatalog, ProjectError> {
        let path = self.describe_cache_path();
        let builtin = TypeCatalog::builtin();
        if !path.exists() {
            return Ok(builtin);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let described: Vec<DescribedType> = serde_json::from_str(&contents)?;
        Ok(builtin.with_describe(&described))
    }

    /// Cache a describe response for later [`Project::load_catalog`] calls.
    pub fn save_describe_cache(&self, described: &[DescribedType]) -> Result<(), ProjectError> {
        let path = self.describe_cache_path();
        let json = serde_json::to_string_pretty(described)?;
        write_atomic(&path, json.as_bytes(), false)
    }
}

/// `<root>/.metasync/settings.yaml`: pure, no I/O.
pub fn settings_path_at(root: &Path) -> PathBuf {
    root.join(METASYNC_DIR).join(SETTINGS_FILE)
}

/// Initialize a project at `root`.
///
/// Creates `src/` and `.metasync/settings.yaml`. Idempotent: if settings
/// already exist they are loaded and returned unchanged.
pub fn init_at(root: &Path, settings: ProjectSettings) -> Result<Project, ProjectError> {
    if settings_path_at(root).exists() {
        return Project::open(root);
    }
    let src = root.join(SOURCE_DIR);
    std::fs::create_dir_all(&src).map_err(|e| io_err(&src, e))?;
    let project = Project {
        root: root.to_path_buf(),
        settings,
    };
    project.save_settings()?;
    Ok(project)
}

pub(crate) fn write_private_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let yaml = serde_yaml::to_string(value)?;
    write_atomic(path, yaml.as_bytes(), true)
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8], private: bool) -> Result<(), ProjectError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("path has no parent")));
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!("{file_name}.tmp"));
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if private {
        set_file_permissions(&tmp)?;
    }
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ProjectError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ProjectError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ProjectError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ProjectError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

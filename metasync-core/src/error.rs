//! Error types for metasync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving a path against the type catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No descriptor matches the path by directory, suffix, or folder parent.
    #[error("cannot resolve artifact type for {path}")]
    UnresolvableType { path: PathBuf },

    /// The path does not live under the project's source root.
    #[error("{path} is outside the source root {root}")]
    OutsideSourceRoot { path: PathBuf, root: PathBuf },

    /// The path shape does not match the owning descriptor.
    #[error("unsupported path shape for {xml_name}: {path}")]
    UnsupportedShape { xml_name: String, path: PathBuf },
}

/// Errors raised while parsing or writing a package manifest document.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not well-formed XML.
    #[error("failed to parse manifest: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The document is well-formed but lacks the expected structure.
    #[error("malformed manifest: {0}")]
    Malformed(String),

    /// Reading or writing the manifest file failed.
    #[error("manifest I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from project settings and org connection persistence.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path for context.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No `.metasync/settings.yaml` under the given directory.
    #[error("not a metasync project (missing {path})")]
    NotAProject { path: PathBuf },

    #[error("an org connection named '{name}' already exists")]
    DuplicateConnection { name: String },

    #[error("no org connection with id or name '{key}'")]
    UnknownConnection { key: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProjectError {
    ProjectError::Io {
        path: path.into(),
        source,
    }
}

//! Error types for metasync-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use metasync_core::{ArtifactKey, CatalogError, ManifestError, ProjectError};
use metasync_remote::RemoteError;

/// All errors that can arise from sync operations.
///
/// A remote job that ran and failed is not an error: it comes back as a
/// result with `success == false` and per-component detail.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Local I/O failure while building a deployable unit.
    #[error("staging failed at {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry '{name}' escapes the destination directory")]
    UnsafeArchiveEntry { name: String },

    /// Network, auth or API failure while talking to the server.
    #[error("{operation} failed ({context}): {source}")]
    RemoteSubmission {
        operation: &'static str,
        context: String,
        #[source]
        source: RemoteError,
    },

    #[error(
        "{operation} timed out after {}s (limit {}s); increase the timeout setting",
        .elapsed.as_secs(),
        .budget.as_secs()
    )]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
        budget: Duration,
    },

    #[error("no local index entry for {key}; run `metasync clean` to rebuild the index")]
    NoLocalIndex { key: ArtifactKey },

    #[error("{path} is not eligible for incremental compile")]
    NotToolingEligible { path: PathBuf },

    #[error("no files given")]
    NothingToDo,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("local index JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn staging_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Staging {
        path: path.into(),
        source,
    }
}

pub(crate) fn remote_err(
    operation: &'static str,
    context: impl Into<String>,
) -> impl FnOnce(RemoteError) -> SyncError {
    let context = context.into();
    move |source| SyncError::RemoteSubmission {
        operation,
        context,
        source,
    }
}

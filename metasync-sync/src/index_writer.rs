//! Single-writer actor for the Local Index.
//!
//! One task owns the in-memory [`LocalIndex`] and the on-disk document.
//! Every mutation is a queued job answered over a oneshot channel and
//! persisted before the reply, so back-to-back operations (compile then
//! refresh) can never lose each other's updates.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use metasync_core::{ArtifactKey, TypeCatalog};
use metasync_remote::FileProperties;

use crate::error::SyncError;
use crate::local_index::{self, IndexUpdate, LocalIndex};

const QUEUE_DEPTH: usize = 64;

enum IndexJob {
    Upsert {
        properties: Vec<FileProperties>,
        respond_to: oneshot::Sender<Result<IndexUpdate, SyncError>>,
    },
    ReplaceAll {
        properties: Vec<FileProperties>,
        respond_to: oneshot::Sender<Result<IndexUpdate, SyncError>>,
    },
    Remove {
        keys: Vec<ArtifactKey>,
        respond_to: oneshot::Sender<Result<usize, SyncError>>,
    },
    MarkConflicted {
        key: ArtifactKey,
        respond_to: oneshot::Sender<Result<bool, SyncError>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<LocalIndex>,
    },
}

/// Cloneable handle to the index writer task.
#[derive(Debug, Clone)]
pub struct LocalIndexHandle {
    jobs: mpsc::Sender<IndexJob>,
}

impl std::fmt::Debug for IndexJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexJob::Upsert { .. } => "Upsert",
            IndexJob::ReplaceAll { .. } => "ReplaceAll",
            IndexJob::Remove { .. } => "Remove",
            IndexJob::MarkConflicted { .. } => "MarkConflicted",
            IndexJob::Snapshot { .. } => "Snapshot",
        };
        f.write_str(name)
    }
}

impl LocalIndexHandle {
    /// Load the index at `path` and spawn its writer on the current tokio
    /// runtime. Must be called from within a runtime.
    pub fn spawn(path: PathBuf, catalog: TypeCatalog) -> Result<Self, SyncError> {
        let index = local_index::load_at(&path)?.entries;
        tracing::debug!(path = %path.display(), entries = index.len(), "local index loaded");
        Ok(Self::spawn_with(index, Some(path), catalog))
    }

    /// Spawn a writer over an existing index. With `path == None` nothing is
    /// persisted.
    pub fn spawn_with(index: LocalIndex, path: Option<PathBuf>, catalog: TypeCatalog) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(index_writer_task(index, path, catalog, rx));
        Self { jobs: tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> IndexJob,
    ) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(build(tx))
            .await
            .map_err(|_| SyncError::ChannelClosed("local index queue"))?;
        rx.await
            .map_err(|_| SyncError::ChannelClosed("local index response"))
    }

    pub async fn upsert(&self, properties: Vec<FileProperties>) -> Result<IndexUpdate, SyncError> {
        self.request(|respond_to| IndexJob::Upsert {
            properties,
            respond_to,
        })
        .await?
    }

    pub async fn replace_all(
        &self,
        properties: Vec<FileProperties>,
    ) -> Result<IndexUpdate, SyncError> {
        self.request(|respond_to| IndexJob::ReplaceAll {
            properties,
            respond_to,
        })
        .await?
    }

    pub async fn remove(&self, keys: Vec<ArtifactKey>) -> Result<usize, SyncError> {
        self.request(|respond_to| IndexJob::Remove { keys, respond_to })
            .await?
    }

    pub async fn mark_conflicted(&self, key: ArtifactKey) -> Result<bool, SyncError> {
        self.request(|respond_to| IndexJob::MarkConflicted { key, respond_to })
            .await?
    }

    /// Point-in-time copy of the index.
    pub async fn snapshot(&self) -> Result<LocalIndex, SyncError> {
        self.request(|respond_to| IndexJob::Snapshot { respond_to })
            .await
    }
}

async fn index_writer_task(
    mut index: LocalIndex,
    path: Option<PathBuf>,
    catalog: TypeCatalog,
    mut jobs: mpsc::Receiver<IndexJob>,
) {
    while let Some(job) = jobs.recv().await {
        tracing::trace!(?job, "local index job");
        match job {
            IndexJob::Upsert {
                properties,
                respond_to,
            } => {
                let update = index.upsert_file_properties(&catalog, &properties);
                let outcome = persist(&path, &index).map(|()| update);
                log_update("upsert", &outcome);
                let _ = respond_to.send(outcome);
            }
            IndexJob::ReplaceAll {
                properties,
                respond_to,
            } => {
                let update = index.replace_all(&catalog, &properties);
                let outcome = persist(&path, &index).map(|()| update);
                log_update("replace_all", &outcome);
                let _ = respond_to.send(outcome);
            }
            IndexJob::Remove { keys, respond_to } => {
                let removed = index.remove(&keys);
                let _ = respond_to.send(persist(&path, &index).map(|()| removed));
            }
            IndexJob::MarkConflicted { key, respond_to } => {
                let found = index.mark_conflicted(&key);
                let outcome = if found {
                    persist(&path, &index).map(|()| true)
                } else {
                    Ok(false)
                };
                let _ = respond_to.send(outcome);
            }
            IndexJob::Snapshot { respond_to } => {
                let _ = respond_to.send(index.clone());
            }
        }
    }
}

fn persist(path: &Option<PathBuf>, index: &LocalIndex) -> Result<(), SyncError> {
    match path {
        Some(path) => local_index::save_at(path, index),
        None => Ok(()),
    }
}

fn log_update(kind: &str, outcome: &Result<IndexUpdate, SyncError>) {
    match outcome {
        Ok(update) => tracing::info!(
            kind,
            upserted = update.upserted,
            skipped = update.skipped,
            "local index updated"
        ),
        Err(err) => tracing::error!(kind, error = %err, "local index update failed"),
    }
}

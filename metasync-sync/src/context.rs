//! Explicit per-operation context: project, configuration snapshot, type
//! catalog, remote client and Local Index writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metasync_core::{
    classify, config, LocalArtifactReference, OrgConnectionTarget, Project, SyncConfig,
    TypeCatalog,
};
use metasync_remote::{HttpMetadataClient, MetadataApi, RemoteError};

use crate::error::{remote_err, SyncError};
use crate::index_writer::LocalIndexHandle;
use crate::poll::PollBudget;

/// Builds a client for a secondary org connection.
pub type ClientFactory = Arc<
    dyn Fn(&OrgConnectionTarget, &str) -> Result<Arc<dyn MetadataApi>, RemoteError> + Send + Sync,
>;

pub struct SyncContext {
    pub project: Project,
    pub config: SyncConfig,
    pub catalog: TypeCatalog,
    pub api: Arc<dyn MetadataApi>,
    pub index: LocalIndexHandle,
    pub connect: ClientFactory,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("project", &self.project.root)
            .field("config", &self.config)
            .field("types", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

/// Default factory: an HTTP client per target.
pub fn http_client_factory() -> ClientFactory {
    Arc::new(|target: &OrgConnectionTarget, api_version: &str| {
        let client = HttpMetadataClient::for_target(target, api_version)?;
        Ok(Arc::new(client) as Arc<dyn MetadataApi>)
    })
}

impl SyncContext {
    /// Layer the user-global configuration and the project settings over
    /// the defaults. An unreadable global file is logged and ignored.
    pub fn resolve_config(project: &Project) -> SyncConfig {
        let global = match config::load_global_config() {
            Ok(global) => global,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring user config");
                Default::default()
            }
        };
        SyncConfig::resolve(&global, &project.settings)
    }

    /// Load the catalog (describe cache applied) and spawn the Local Index
    /// writer. Must be called from within a tokio runtime.
    pub fn with_config(
        project: Project,
        config: SyncConfig,
        api: Arc<dyn MetadataApi>,
    ) -> Result<Self, SyncError> {
        let catalog = project.load_catalog()?;
        let index = LocalIndexHandle::spawn(project.local_store_path(), catalog.clone())?;
        Ok(Self {
            project,
            config,
            catalog,
            api,
            index,
            connect: http_client_factory(),
        })
    }

    pub fn with_client_factory(mut self, connect: ClientFactory) -> Self {
        self.connect = connect;
        self
    }

    pub fn source_root(&self) -> PathBuf {
        self.project.source_root()
    }

    /// Human-readable target for error context.
    pub fn target_label(&self) -> String {
        self.project.settings.instance_url.clone()
    }

    pub fn deploy_budget(&self) -> PollBudget {
        PollBudget {
            interval: self.config.poll_interval,
            timeout: self.config.deploy_timeout,
        }
    }

    pub fn tooling_budget(&self) -> PollBudget {
        PollBudget {
            interval: self.config.poll_interval,
            timeout: self.config.tooling_timeout,
        }
    }

    /// Classify `paths`. Relative paths are taken relative to the project
    /// root.
    pub fn resolve(&self, paths: &[PathBuf]) -> Result<Vec<LocalArtifactReference>, SyncError> {
        let source_root = self.source_root();
        paths
            .iter()
            .map(|path| {
                let absolute = if path.is_absolute() {
                    path.clone()
                } else {
                    self.project.root.join(path)
                };
                Ok(classify(&absolute, &source_root, &self.catalog)?)
            })
            .collect()
    }

    pub fn resolve_one(&self, path: &Path) -> Result<LocalArtifactReference, SyncError> {
        let mut resolved = self.resolve(&[path.to_path_buf()])?;
        resolved.pop().ok_or(SyncError::NothingToDo)
    }

    /// Fetch the server describe, cache it in the project and swap the
    /// catalog. The Local Index writer keeps the catalog it was spawned with
    /// until the context is rebuilt.
    pub async fn refresh_catalog(&mut self) -> Result<usize, SyncError> {
        let described = self
            .api
            .describe()
            .await
            .map_err(remote_err("describe", self.target_label()))?;
        self.project.save_describe_cache(&described)?;
        self.catalog = self.catalog.with_describe(&described);
        tracing::info!(types = described.len(), "type catalog refreshed");
        Ok(described.len())
    }
}

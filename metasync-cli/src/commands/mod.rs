pub mod conflicts;
pub mod deploy;
pub mod describe;
pub mod index;
pub mod init;
pub mod org;
pub mod sync;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};

use metasync_core::Project;
use metasync_remote::{HttpMetadataClient, MetadataApi};
use metasync_sync::SyncContext;

/// Open `explicit`, or the nearest project enclosing the working directory.
pub fn open_project(explicit: Option<&Path>) -> Result<Project> {
    match explicit {
        Some(root) => Project::open(root)
            .with_context(|| format!("no metasync project at '{}'", root.display())),
        None => {
            let cwd = std::env::current_dir().context("could not determine working directory")?;
            Project::discover(&cwd).context("not inside a metasync project; run `metasync init`")
        }
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Build a context talking to the project's own org. Must run inside the
/// runtime.
pub fn connect(project: Project) -> Result<SyncContext> {
    let config = SyncContext::resolve_config(&project);
    let token = project.settings.effective_access_token().context(
        "no access token; set METASYNC_ACCESS_TOKEN or access_token in .metasync/settings.yaml",
    )?;
    let client = HttpMetadataClient::new(
        project.settings.instance_url.clone(),
        token,
        config.api_version.clone(),
    )
    .context("failed to build metadata client")?;
    let api: Arc<dyn MetadataApi> = Arc::new(client);
    SyncContext::with_config(project, config, api).context("failed to open sync context")
}

pub fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

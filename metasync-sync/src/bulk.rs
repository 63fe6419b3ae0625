//! Bulk deploy/retrieve orchestrator: one archive-based remote job each,
//! polled to completion, with Local Index reconciliation afterwards.

use std::path::{Path, PathBuf};

use metasync_core::PackageManifest;
use metasync_remote::{DeployOptions, DeployResult, MetadataApi, RetrieveResult};

use crate::context::SyncContext;
use crate::error::{io_err, remote_err, SyncError};
use crate::local_index::IndexUpdate;
use crate::merge::{self, WriteResult};
use crate::poll::{poll_until, PollBudget, PollOutcome};
use crate::staging;

/// File name of the raw retrieve archive inside the destination directory.
pub const RETRIEVE_ARCHIVE: &str = "retrieve.zip";
/// Sub-directory the retrieve archive is unpacked into.
pub const RETRIEVE_TREE: &str = "package";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Rebuild the Local Index from this retrieve instead of upserting.
    pub replace_index: bool,
    /// Copy changed files over the project source tree.
    pub merge_into_project: bool,
}

#[derive(Debug)]
pub struct RetrieveOutcome {
    pub result: RetrieveResult,
    /// Unpacked package tree (empty path when the job failed).
    pub tree: PathBuf,
    pub files: Vec<PathBuf>,
    pub index_update: IndexUpdate,
    pub merged: Vec<WriteResult>,
}

impl RetrieveOutcome {
    pub fn success(&self) -> bool {
        self.result.success
    }
}

/// Submit `archive` to `api` and poll it to completion. Touches nothing
/// locally; used directly for foreign org targets.
pub async fn deploy_to(
    api: &dyn MetadataApi,
    budget: PollBudget,
    archive: Vec<u8>,
    options: &DeployOptions,
    target: &str,
) -> Result<DeployResult, SyncError> {
    let bytes = archive.len();
    let job = api
        .submit_deploy(archive, options)
        .await
        .map_err(remote_err("deploy", format!("{bytes} byte archive to {target}")))?;
    tracing::info!(job = %job, target, check_only = options.check_only, "deploy submitted");

    let outcome = poll_until(
        budget,
        || api.check_deploy_status(&job),
        |r: &DeployResult| r.done,
    )
    .await
    .map_err(remote_err("deploy status", format!("job {job} on {target}")))?;
    let result = match outcome {
        PollOutcome::Done(result) => result,
        PollOutcome::TimedOut { elapsed } => {
            return Err(SyncError::Timeout {
                operation: "deploy",
                elapsed,
                budget: budget.timeout,
            })
        }
    };

    if result.success {
        tracing::info!(
            job = %job,
            deployed = result.number_components_deployed,
            "deploy succeeded"
        );
    } else {
        tracing::warn!(
            job = %job,
            failures = result.component_failures.len(),
            status = ?result.status,
            "deploy failed"
        );
    }
    Ok(result)
}

/// Deploy to the project's own org and, when the deploy retrieved its
/// components back, upsert their file properties into the Local Index.
pub async fn deploy(
    ctx: &SyncContext,
    archive: Vec<u8>,
    options: &DeployOptions,
) -> Result<DeployResult, SyncError> {
    let result = deploy_to(
        ctx.api.as_ref(),
        ctx.deploy_budget(),
        archive,
        options,
        &ctx.target_label(),
    )
    .await?;

    if result.success && options.perform_retrieve {
        match &result.retrieve_result {
            Some(retrieved) => {
                ctx.index.upsert(retrieved.file_properties.clone()).await?;
            }
            None => tracing::debug!("deploy returned no retrieve result"),
        }
    }
    Ok(result)
}

/// Retrieve `manifest` into `destination`: the raw archive is written to
/// `destination/retrieve.zip` and unpacked under `destination/package`.
pub async fn retrieve(
    ctx: &SyncContext,
    manifest: &PackageManifest,
    destination: &Path,
    options: RetrieveOptions,
) -> Result<RetrieveOutcome, SyncError> {
    let target = ctx.target_label();
    let budget = ctx.deploy_budget();
    let job = ctx
        .api
        .submit_retrieve(manifest)
        .await
        .map_err(remote_err(
            "retrieve",
            format!("{} member(s) from {target}", manifest.member_count()),
        ))?;
    tracing::info!(job = %job, target = %target, "retrieve submitted");

    let outcome = poll_until(
        budget,
        || ctx.api.check_retrieve_status(&job),
        |r: &RetrieveResult| r.done,
    )
    .await
    .map_err(remote_err("retrieve status", format!("job {job} on {target}")))?;
    let result = match outcome {
        PollOutcome::Done(result) => result,
        PollOutcome::TimedOut { elapsed } => {
            return Err(SyncError::Timeout {
                operation: "retrieve",
                elapsed,
                budget: budget.timeout,
            })
        }
    };

    let mut outcome = RetrieveOutcome {
        result,
        tree: PathBuf::new(),
        files: Vec::new(),
        index_update: IndexUpdate::default(),
        merged: Vec::new(),
    };
    if !outcome.result.success {
        tracing::warn!(
            job = %job,
            error = outcome.result.error_message.as_deref().unwrap_or("unknown"),
            "retrieve failed"
        );
        return Ok(outcome);
    }

    let tree = destination.join(RETRIEVE_TREE);
    if let Some(zip) = outcome.result.zip_file.as_deref() {
        std::fs::create_dir_all(destination).map_err(|e| io_err(destination, e))?;
        let archive_path = destination.join(RETRIEVE_ARCHIVE);
        std::fs::write(&archive_path, zip).map_err(|e| io_err(&archive_path, e))?;
        outcome.files = staging::unpack(zip, &tree)?;
    }
    outcome.tree = tree;

    let properties = outcome.result.file_properties.clone();
    outcome.index_update = if options.replace_index {
        ctx.index.replace_all(properties).await?
    } else {
        ctx.index.upsert(properties).await?
    };

    if options.merge_into_project && outcome.tree.is_dir() {
        outcome.merged = merge::merge_into_project(&outcome.tree, &ctx.source_root())?;
    }
    Ok(outcome)
}

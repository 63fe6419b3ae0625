//! Intent layer: map a user intent plus a list of paths onto the
//! orchestrators and fold the outcome into an [`OperationResult`].
//!
//! | Intent            | Remote path                       | Local effects                          |
//! |-------------------|-----------------------------------|----------------------------------------|
//! | `Compile`         | container, or deploy fallback     | index refresh                          |
//! | `Create`          | deploy + retrieve                 | index upsert, manifest insert          |
//! | `Delete`          | destructive deploy                | index remove, files + manifest removed |
//! | `Refresh`         | retrieve                          | index upsert, merge                    |
//! | `Clean`           | retrieve of the project manifest  | index rebuilt, merge                   |
//! | `DeployToTargets` | deploy per foreign org            | none                                   |

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use metasync_core::{
    connections, Classification, LocalArtifactReference, OrgConnectionTarget, PackageManifest,
};
use metasync_remote::{DeployOptions, DeployResult};

use crate::bulk::{self, RetrieveOptions, RetrieveOutcome};
use crate::conflict::{self, Conflict, ConflictStatus};
use crate::context::SyncContext;
use crate::error::{io_err, remote_err, SyncError};
use crate::staging;
use crate::tooling::{self, ToolingCompileResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Save local changes to the server. `force` skips the conflict check.
    Compile { force: bool },
    Create,
    Delete,
    Refresh,
    Clean,
    /// Deploy the project (or the given paths) to other orgs by name or id.
    DeployToTargets {
        targets: Vec<String>,
        options: DeployOptions,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Compile { .. } => "compile",
            Intent::Create => "create",
            Intent::Delete => "delete",
            Intent::Refresh => "refresh",
            Intent::Clean => "clean",
            Intent::DeployToTargets { .. } => "deploy",
        }
    }
}

#[derive(Debug)]
pub struct OperationResult {
    pub success: bool,
    pub details: OperationDetails,
}

#[derive(Debug)]
pub enum OperationDetails {
    Tooling(ToolingCompileResult),
    Deploy(DeployResult),
    /// The compile was refused; nothing was sent.
    Conflicts(Vec<Conflict>),
    Deleted {
        result: DeployResult,
        removed_files: Vec<PathBuf>,
        removed_index_entries: usize,
    },
    /// `workdir` holds the unpacked tree until the result is dropped.
    Retrieve {
        outcome: RetrieveOutcome,
        workdir: TempDir,
    },
    Targets(Vec<TargetOutcome>),
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub target: OrgConnectionTarget,
    pub result: Result<DeployResult, SyncError>,
}

impl TargetOutcome {
    pub fn success(&self) -> bool {
        matches!(&self.result, Ok(result) if result.success)
    }
}

/// Run `intent` against `paths` (absolute, or relative to the project root).
pub async fn run(
    ctx: &SyncContext,
    intent: Intent,
    paths: &[PathBuf],
) -> Result<OperationResult, SyncError> {
    tracing::info!(intent = intent.name(), paths = paths.len(), "running");
    match intent {
        Intent::Compile { force } => compile(ctx, &resolve_required(ctx, paths)?, force).await,
        Intent::Create => create(ctx, &resolve_required(ctx, paths)?).await,
        Intent::Delete => delete(ctx, &resolve_required(ctx, paths)?).await,
        Intent::Refresh => refresh(ctx, &resolve_required(ctx, paths)?).await,
        Intent::Clean => clean(ctx).await,
        Intent::DeployToTargets { targets, options } => {
            let artifacts = ctx.resolve(paths)?;
            deploy_to_targets(ctx, &artifacts, &targets, &options).await
        }
    }
}

fn resolve_required(
    ctx: &SyncContext,
    paths: &[PathBuf],
) -> Result<Vec<LocalArtifactReference>, SyncError> {
    if paths.is_empty() {
        return Err(SyncError::NothingToDo);
    }
    ctx.resolve(paths)
}

fn ephemeral_manifest(ctx: &SyncContext, artifacts: &[LocalArtifactReference]) -> PackageManifest {
    PackageManifest::from_artifacts(artifacts, Some(&ctx.config.api_version))
}

async fn deploy_artifacts(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
    options: &DeployOptions,
) -> Result<DeployResult, SyncError> {
    let manifest = ephemeral_manifest(ctx, artifacts);
    let staged = staging::stage(&ctx.source_root(), artifacts, &manifest)?;
    bulk::deploy(ctx, staged.into_archive(), options).await
}

// ---------------------------------------------------------------------------
// Compile
// ---------------------------------------------------------------------------

async fn compile(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
    force: bool,
) -> Result<OperationResult, SyncError> {
    if !force && ctx.config.check_conflicts_before_compile {
        let conflicts = detect_conflicts(ctx, artifacts).await?;
        if !conflicts.is_empty() {
            tracing::warn!(conflicts = conflicts.len(), "compile refused");
            return Ok(OperationResult {
                success: false,
                details: OperationDetails::Conflicts(conflicts),
            });
        }
    }

    if use_tooling(ctx, artifacts).await? {
        let result = tooling::compile(ctx, artifacts).await?;
        return Ok(OperationResult {
            success: result.success,
            details: OperationDetails::Tooling(result),
        });
    }

    tracing::info!("compiling through a deploy");
    let result = deploy_artifacts(ctx, artifacts, &DeployOptions::for_compile()).await?;
    Ok(OperationResult {
        success: result.success,
        details: OperationDetails::Deploy(result),
    })
}

/// Point-read every indexed incremental-compile artifact. Artifacts that
/// were never indexed are new to the server and cannot conflict.
async fn detect_conflicts(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<Vec<Conflict>, SyncError> {
    let index = ctx.index.snapshot().await?;
    let mut conflicts = Vec::new();
    for artifact in artifacts {
        if !artifact.is_tooling_eligible() || index.get(&artifact.index_key()).is_none() {
            continue;
        }
        if let ConflictStatus::Conflict(found) = conflict::check(ctx, artifact).await? {
            conflicts.push(found);
        }
    }
    Ok(conflicts)
}

/// The container path needs every artifact eligible and already known to the
/// server.
async fn use_tooling(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<bool, SyncError> {
    if !artifacts.iter().all(LocalArtifactReference::is_tooling_eligible) {
        return Ok(false);
    }
    let index = ctx.index.snapshot().await?;
    Ok(artifacts.iter().all(|artifact| {
        index
            .get(&artifact.index_key())
            .is_some_and(|entry| entry.id.is_some())
    }))
}

// ---------------------------------------------------------------------------
// Create / Delete
// ---------------------------------------------------------------------------

async fn create(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<OperationResult, SyncError> {
    let result = deploy_artifacts(ctx, artifacts, &DeployOptions::for_compile()).await?;
    if result.success {
        let mut manifest = ctx.project.load_manifest()?;
        manifest.insert(artifacts);
        ctx.project.save_manifest(&manifest)?;
        tracing::info!(added = artifacts.len(), "project manifest updated");
    }
    Ok(OperationResult {
        success: result.success,
        details: OperationDetails::Deploy(result),
    })
}

async fn delete(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<OperationResult, SyncError> {
    let manifest = ephemeral_manifest(ctx, artifacts);
    let staged = staging::stage_delete(&manifest)?;
    let options = DeployOptions {
        rollback_on_error: true,
        single_package: true,
        ..DeployOptions::default()
    };
    let result = bulk::deploy(ctx, staged.into_archive(), &options).await?;
    if !result.success {
        return Ok(OperationResult {
            success: false,
            details: OperationDetails::Deleted {
                result,
                removed_files: Vec::new(),
                removed_index_entries: 0,
            },
        });
    }

    let keys: BTreeSet<_> = artifacts.iter().map(|a| a.index_key()).collect();
    let removed_index_entries = ctx.index.remove(keys.into_iter().collect()).await?;

    let mut removed_files = Vec::new();
    for artifact in artifacts {
        for path in local_footprint(artifact) {
            if remove_path(&path)? {
                removed_files.push(path);
            }
        }
    }

    let mut project_manifest = ctx.project.load_manifest()?;
    project_manifest.remove(artifacts);
    ctx.project.save_manifest(&project_manifest)?;
    tracing::info!(
        files = removed_files.len(),
        index_entries = removed_index_entries,
        "deleted"
    );

    Ok(OperationResult {
        success: true,
        details: OperationDetails::Deleted {
            result,
            removed_files,
            removed_index_entries,
        },
    })
}

/// Local paths owned by an artifact once the server copy is gone: the
/// primary file and its `-meta.xml`, whichever of the two was named.
fn local_footprint(artifact: &LocalArtifactReference) -> Vec<PathBuf> {
    match artifact.classification {
        Classification::BundleItem => staging::bundle_root(artifact).into_iter().collect(),
        _ => [artifact.primary_path(), artifact.meta_path()]
            .into_iter()
            .filter(|path| path.exists())
            .collect(),
    }
}

/// Remove a file or directory; `Ok(false)` when it was already gone.
fn remove_path(path: &Path) -> Result<bool, SyncError> {
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// Refresh / Clean
// ---------------------------------------------------------------------------

async fn refresh(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<OperationResult, SyncError> {
    let manifest = ephemeral_manifest(ctx, artifacts);
    retrieve_and_merge(ctx, &manifest, false).await
}

async fn clean(ctx: &SyncContext) -> Result<OperationResult, SyncError> {
    let mut manifest = ctx.project.load_manifest()?;
    if manifest.is_empty() {
        return Err(SyncError::NothingToDo);
    }
    if manifest.version().is_none() {
        manifest.set_version(ctx.config.api_version.clone());
    }
    retrieve_and_merge(ctx, &manifest, true).await
}

async fn retrieve_and_merge(
    ctx: &SyncContext,
    manifest: &PackageManifest,
    replace_index: bool,
) -> Result<OperationResult, SyncError> {
    let workdir = tempfile::Builder::new()
        .prefix("metasync-retrieve-")
        .tempdir()
        .map_err(|e| io_err(std::env::temp_dir(), e))?;
    let options = RetrieveOptions {
        replace_index,
        merge_into_project: true,
    };
    let outcome = bulk::retrieve(ctx, manifest, workdir.path(), options).await?;
    Ok(OperationResult {
        success: outcome.success(),
        details: OperationDetails::Retrieve { outcome, workdir },
    })
}

// ---------------------------------------------------------------------------
// Deploy to other orgs
// ---------------------------------------------------------------------------

async fn deploy_to_targets(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
    targets: &[String],
    options: &DeployOptions,
) -> Result<OperationResult, SyncError> {
    if targets.is_empty() {
        return Err(SyncError::NothingToDo);
    }
    let resolved = targets
        .iter()
        .map(|key| connections::find_connection(&ctx.project, key))
        .collect::<Result<Vec<_>, _>>()?;

    let staged = if artifacts.is_empty() {
        let manifest = ctx.project.load_manifest()?;
        staging::stage_project(&ctx.source_root(), &manifest)?
    } else {
        staging::stage(&ctx.source_root(), artifacts, &ephemeral_manifest(ctx, artifacts))?
    };
    let archive = staged.into_archive();

    let mut outcomes = Vec::with_capacity(resolved.len());
    for target in resolved {
        let result = match (ctx.connect)(&target, &ctx.config.api_version) {
            Ok(api) => {
                bulk::deploy_to(
                    api.as_ref(),
                    ctx.deploy_budget(),
                    archive.clone(),
                    options,
                    &target.name,
                )
                .await
            }
            Err(err) => Err(remote_err("connect", target.name.clone())(err)),
        };
        if let Err(err) = &result {
            tracing::warn!(target = %target.name, error = %err, "target deploy failed");
        }
        outcomes.push(TargetOutcome { target, result });
    }

    let success = outcomes.iter().all(TargetOutcome::success);
    Ok(OperationResult {
        success,
        details: OperationDetails::Targets(outcomes),
    })
}

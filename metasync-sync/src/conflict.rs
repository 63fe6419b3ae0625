//! Conflict detection before overwrite-producing operations.
//!
//! A point read of the remote copy (body + `LastModifiedDate`) is compared
//! against the Local Index entry. The canonical local file is never
//! written; a conflict produces a disposable snapshot of the remote body and
//! a unified diff for inspection.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use similar::TextDiff;
use tempfile::TempPath;

use metasync_core::{ArtifactKey, LocalArtifactReference, RemoteId};

use crate::context::SyncContext;
use crate::error::{io_err, remote_err, SyncError};
use crate::local_index::LocalIndexEntry;

/// Remote record returned by a point read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RemoteRecord {
    pub id: RemoteId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(with = "metasync_remote::time")]
    pub last_modified_date: DateTime<Utc>,
    #[serde(default)]
    pub last_modified_by_id: Option<String>,
}

#[derive(Debug)]
pub struct Conflict {
    pub key: ArtifactKey,
    pub local: LocalIndexEntry,
    pub remote_last_modified: DateTime<Utc>,
    pub remote_last_modified_by_id: Option<String>,
    /// Remote body; removed when the conflict is dropped.
    pub remote_snapshot: TempPath,
    pub diff: String,
}

#[derive(Debug)]
pub enum ConflictStatus {
    InSync { key: ArtifactKey },
    Conflict(Conflict),
    /// The record no longer exists on the server; nothing to overwrite.
    RemoteMissing { key: ArtifactKey },
    /// Only incremental-compile types support point reads.
    Unsupported { key: ArtifactKey, xml_name: String },
}

impl ConflictStatus {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictStatus::Conflict(_))
    }
}

pub(crate) fn escape_soql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Check one artifact. Fails with [`SyncError::NoLocalIndex`] when the
/// artifact has never been indexed.
pub async fn check(
    ctx: &SyncContext,
    artifact: &LocalArtifactReference,
) -> Result<ConflictStatus, SyncError> {
    let key = artifact.index_key();
    let Some(tooling) = artifact.descriptor.tooling.as_ref() else {
        return Ok(ConflictStatus::Unsupported {
            key,
            xml_name: artifact.xml_name().to_owned(),
        });
    };
    let index = ctx.index.snapshot().await?;
    let Some(local) = index.get(&key).cloned() else {
        return Err(SyncError::NoLocalIndex { key });
    };

    let soql = format!(
        "SELECT Id, LastModifiedDate, LastModifiedById, {} FROM {} WHERE Name = '{}'",
        tooling.body_field,
        artifact.xml_name(),
        escape_soql(&artifact.name)
    );
    let records = ctx
        .api
        .query(&soql)
        .await
        .map_err(remote_err("conflict check", format!("{key} on {}", ctx.target_label())))?;
    let Some(raw) = records.into_iter().next() else {
        tracing::info!(key = %key, "remote copy missing");
        return Ok(ConflictStatus::RemoteMissing { key });
    };
    let body = raw
        .get(&tooling.body_field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned();
    let remote: RemoteRecord = serde_json::from_value(raw)?;

    if remote.last_modified_date <= local.last_modified_date {
        tracing::debug!(key = %key, "in sync");
        return Ok(ConflictStatus::InSync { key });
    }

    tracing::warn!(
        key = %key,
        local = %local.last_modified_date,
        remote = %remote.last_modified_date,
        "remote copy changed since last sync"
    );
    let remote_snapshot = write_snapshot(artifact, &body)?;
    let diff = unified_diff(artifact, &body)?;
    ctx.index.mark_conflicted(key.clone()).await?;

    Ok(ConflictStatus::Conflict(Conflict {
        key,
        local,
        remote_last_modified: remote.last_modified_date,
        remote_last_modified_by_id: remote.last_modified_by_id,
        remote_snapshot,
        diff,
    }))
}

/// Check each artifact in turn.
pub async fn check_all(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<Vec<ConflictStatus>, SyncError> {
    let mut statuses = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        statuses.push(check(ctx, artifact).await?);
    }
    Ok(statuses)
}

fn write_snapshot(artifact: &LocalArtifactReference, body: &str) -> Result<TempPath, SyncError> {
    let suffix = artifact
        .descriptor
        .suffix
        .as_deref()
        .map(|s| format!(".{s}"))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{}-remote-", artifact.name))
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| io_err(std::env::temp_dir(), e))?;
    file.write_all(body.as_bytes())
        .map_err(|e| io_err(file.path(), e))?;
    Ok(file.into_temp_path())
}

fn unified_diff(artifact: &LocalArtifactReference, remote: &str) -> Result<String, SyncError> {
    let path = artifact.primary_path();
    let local = match std::fs::read_to_string(&path) {
        Ok(content) => content.replace("\r\n", "\n"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(io_err(&path, err)),
    };
    let remote = remote.replace("\r\n", "\n");
    let relative = artifact.relative_path.display();
    let old_header = format!("local/{relative}");
    let new_header = format!("remote/{relative}");
    Ok(TextDiff::from_lines(&local, &remote)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string())
}

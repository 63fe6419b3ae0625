//! Incremental (container) compile orchestrator.
//!
//! ```text
//! Created → ContainerOpen → MembersSubmitted → AsyncRequested → Polling
//!         → {Completed | Failed | TimedOut} → ContainerDeleted
//! ```
//!
//! Once a container id exists it gets exactly one deletion attempt, whatever
//! the outcome. Cleanup failures are logged and never replace the outcome.

use std::collections::BTreeMap;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;

use metasync_core::{ArtifactKey, LocalArtifactReference, RemoteId};
use metasync_remote::{
    AsyncRequestState, AsyncRequestStatus, ContainerMember, DeployMessage, FileProperties,
};

use crate::conflict::RemoteRecord;
use crate::context::SyncContext;
use crate::error::{remote_err, staging_err, SyncError};
use crate::poll::{poll_until, PollOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerState {
    Created,
    ContainerOpen,
    MembersSubmitted,
    AsyncRequested,
    Polling,
    Completed,
    Failed,
    TimedOut,
    ContainerDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberFailure {
    pub key: ArtifactKey,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolingCompileResult {
    pub success: bool,
    /// Every state visited, ending in `ContainerDeleted`.
    pub transitions: Vec<ContainerState>,
    pub container_id: RemoteId,
    pub async_request_id: Option<RemoteId>,
    pub member_failures: Vec<MemberFailure>,
    pub component_failures: Vec<DeployMessage>,
    pub component_successes: Vec<DeployMessage>,
    pub error_message: Option<String>,
    pub cleanup_error: Option<String>,
}

impl ToolingCompileResult {
    pub fn final_state(&self) -> Option<ContainerState> {
        self.transitions
            .iter()
            .rev()
            .find(|s| **s != ContainerState::ContainerDeleted)
            .copied()
    }
}

struct PreparedMember {
    key: ArtifactKey,
    full_name: String,
    xml_name: String,
    directory_name: String,
    suffix: Option<String>,
    member_type: String,
    entity_id: RemoteId,
    body: String,
}

/// Compile `artifacts` through a disposable container.
///
/// Every artifact must be eligible and indexed with a remote id; these
/// preconditions are checked before any remote state is created.
pub async fn compile(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<ToolingCompileResult, SyncError> {
    if artifacts.is_empty() {
        return Err(SyncError::NothingToDo);
    }
    let members = prepare(ctx, artifacts).await?;
    let target = ctx.target_label();

    let mut transitions = vec![ContainerState::Created];
    let name = format!("metasync-{}", Utc::now().timestamp_millis());
    let container_id = ctx
        .api
        .create_container(&name)
        .await
        .map_err(remote_err("create container", format!("{name} on {target}")))?;
    transitions.push(ContainerState::ContainerOpen);
    tracing::info!(container = %container_id, members = members.len(), "container open");

    let outcome = run_container(ctx, &container_id, &members, &mut transitions).await;

    let cleanup_error = match ctx.api.delete_container(&container_id).await {
        Ok(()) => None,
        Err(err) => {
            tracing::warn!(container = %container_id, error = %err, "container cleanup failed");
            Some(err.to_string())
        }
    };
    transitions.push(ContainerState::ContainerDeleted);
    tracing::debug!(container = %container_id, ?transitions, "container closed");

    let mut result = outcome?;
    result.transitions = transitions;
    result.cleanup_error = cleanup_error;

    if result.success {
        refresh_index(ctx, &members).await;
    }
    Ok(result)
}

async fn prepare(
    ctx: &SyncContext,
    artifacts: &[LocalArtifactReference],
) -> Result<Vec<PreparedMember>, SyncError> {
    let index = ctx.index.snapshot().await?;
    artifacts
        .iter()
        .map(|artifact| {
            let tooling = artifact
                .descriptor
                .tooling
                .as_ref()
                .filter(|_| artifact.is_tooling_eligible())
                .ok_or_else(|| SyncError::NotToolingEligible {
                    path: artifact.path.clone(),
                })?;
            let key = artifact.index_key();
            let entity_id = index
                .get(&key)
                .and_then(|entry| entry.id.clone())
                .ok_or_else(|| SyncError::NoLocalIndex { key: key.clone() })?;
            let body = std::fs::read_to_string(&artifact.path)
                .map_err(|e| staging_err(&artifact.path, e))?;
            Ok(PreparedMember {
                key,
                full_name: artifact.package_member_name.clone(),
                xml_name: artifact.xml_name().to_owned(),
                directory_name: artifact.descriptor.directory_name.clone(),
                suffix: artifact.descriptor.suffix.clone(),
                member_type: tooling.member_type.clone(),
                entity_id,
                body,
            })
        })
        .collect()
}

/// Everything between `ContainerOpen` and the terminal state. `Err` means
/// the outcome could not be decided; the caller still cleans up.
async fn run_container(
    ctx: &SyncContext,
    container_id: &RemoteId,
    members: &[PreparedMember],
    transitions: &mut Vec<ContainerState>,
) -> Result<ToolingCompileResult, SyncError> {
    let mut result = ToolingCompileResult {
        success: false,
        transitions: Vec::new(),
        container_id: container_id.clone(),
        async_request_id: None,
        member_failures: Vec::new(),
        component_failures: Vec::new(),
        component_successes: Vec::new(),
        error_message: None,
        cleanup_error: None,
    };

    let requests: Vec<ContainerMember> = members
        .iter()
        .map(|m| ContainerMember {
            member_type: m.member_type.clone(),
            container_id: container_id.clone(),
            content_entity_id: m.entity_id.clone(),
            body: m.body.clone(),
        })
        .collect();
    let saves = join_all(requests.iter().map(|r| ctx.api.create_member(r))).await;
    for (member, save) in members.iter().zip(saves) {
        let message = match save {
            Ok(save) if save.success => continue,
            Ok(save) => save.error_message(),
            Err(err) => err.to_string(),
        };
        tracing::warn!(key = %member.key, error = %message, "member create failed");
        result.member_failures.push(MemberFailure {
            key: member.key.clone(),
            message,
        });
    }
    if !result.member_failures.is_empty() {
        transitions.push(ContainerState::Failed);
        result.error_message = Some(format!(
            "{} of {} member(s) could not be added to the container",
            result.member_failures.len(),
            members.len()
        ));
        return Ok(result);
    }
    transitions.push(ContainerState::MembersSubmitted);

    let target = ctx.target_label();
    let request_id = ctx
        .api
        .create_async_request(container_id)
        .await
        .map_err(remote_err("compile request", format!("container {container_id} on {target}")))?;
    transitions.push(ContainerState::AsyncRequested);
    result.async_request_id = Some(request_id.clone());

    transitions.push(ContainerState::Polling);
    let budget = ctx.tooling_budget();
    let outcome = poll_until(
        budget,
        || ctx.api.check_async_request(&request_id),
        |status: &AsyncRequestStatus| status.state.is_terminal(),
    )
    .await
    .map_err(remote_err("compile status", format!("request {request_id} on {target}")))?;

    let status = match outcome {
        PollOutcome::Done(status) => status,
        PollOutcome::TimedOut { elapsed } => {
            transitions.push(ContainerState::TimedOut);
            return Err(SyncError::Timeout {
                operation: "incremental compile",
                elapsed,
                budget: budget.timeout,
            });
        }
    };

    result.success = status.state == AsyncRequestState::Completed;
    transitions.push(if result.success {
        ContainerState::Completed
    } else {
        ContainerState::Failed
    });
    tracing::info!(
        request = %request_id,
        state = ?status.state,
        failures = status.component_failures.len(),
        "compile finished"
    );
    result.error_message = status.error_message;
    result.component_failures = status.component_failures;
    result.component_successes = status.component_successes;
    Ok(result)
}

/// Pull fresh `LastModifiedDate`s for the compiled records. Failures only
/// leave the index stale, so they are logged.
async fn refresh_index(ctx: &SyncContext, members: &[PreparedMember]) {
    let mut by_type: BTreeMap<&str, Vec<&PreparedMember>> = BTreeMap::new();
    for member in members {
        by_type.entry(member.xml_name.as_str()).or_default().push(member);
    }

    let mut properties = Vec::new();
    for (xml_name, group) in by_type {
        let ids = group
            .iter()
            .map(|m| format!("'{}'", m.entity_id))
            .collect::<Vec<_>>()
            .join(", ");
        let soql = format!(
            "SELECT Id, Name, LastModifiedDate, LastModifiedById FROM {xml_name} WHERE Id IN ({ids})"
        );
        let records = match ctx.api.query(&soql).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(xml_name, error = %err, "index refresh query failed");
                continue;
            }
        };
        for raw in records {
            let record: RemoteRecord = match serde_json::from_value(raw) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable index refresh record");
                    continue;
                }
            };
            let Some(member) = group.iter().find(|m| m.entity_id == record.id) else {
                continue;
            };
            let full_name = record.name.unwrap_or_else(|| member.full_name.clone());
            let file_name = match &member.suffix {
                Some(suffix) => format!("{}/{full_name}.{suffix}", member.directory_name),
                None => format!("{}/{full_name}", member.directory_name),
            };
            properties.push(FileProperties {
                full_name,
                file_name,
                type_name: xml_name.to_owned(),
                id: Some(record.id),
                last_modified_date: Some(record.last_modified_date),
                last_modified_by_id: record.last_modified_by_id,
                last_modified_by_name: None,
                created_date: None,
                manageable_state: None,
            });
        }
    }

    if properties.is_empty() {
        return;
    }
    if let Err(err) = ctx.index.upsert(properties).await {
        tracing::warn!(error = %err, "index refresh after compile failed");
    }
}

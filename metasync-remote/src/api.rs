//! The remote API contract and its normalized result types.
//!
//! Wire payloads are deserialized into private `Wire*` structs where
//! one-or-many fields are collapsed into `Vec`s, then converted into the
//! public types below. Nothing downstream ever sees a bare object where a
//! list is expected.

use std::fmt;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull, DisplayFromStr, OneOrMany, PickFirst};

use metasync_core::{DescribedType, PackageManifest, RemoteId};

use crate::error::RemoteError;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Everything the sync engine needs from the server.
///
/// Long-running jobs are submit / check pairs; implementations never poll.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn describe(&self) -> Result<Vec<DescribedType>, RemoteError>;

    async fn submit_deploy(
        &self,
        archive: Vec<u8>,
        options: &DeployOptions,
    ) -> Result<JobId, RemoteError>;
    async fn check_deploy_status(&self, job: &JobId) -> Result<DeployResult, RemoteError>;

    async fn submit_retrieve(&self, manifest: &PackageManifest) -> Result<JobId, RemoteError>;
    async fn check_retrieve_status(&self, job: &JobId) -> Result<RetrieveResult, RemoteError>;

    /// Data query; returns every record across result pages.
    async fn query(&self, soql: &str) -> Result<Vec<serde_json::Value>, RemoteError>;
    async fn tooling_query(&self, soql: &str) -> Result<Vec<serde_json::Value>, RemoteError>;

    async fn create_container(&self, name: &str) -> Result<RemoteId, RemoteError>;
    async fn delete_container(&self, id: &RemoteId) -> Result<(), RemoteError>;
    /// A rejected member is `Ok` with `success == false`.
    async fn create_member(&self, member: &ContainerMember) -> Result<SaveResult, RemoteError>;
    async fn create_async_request(&self, container: &RemoteId) -> Result<RemoteId, RemoteError>;
    async fn check_async_request(&self, id: &RemoteId) -> Result<AsyncRequestStatus, RemoteError>;
}

/// Server-assigned asynchronous job id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Deploy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestLevel {
    NoTestRun,
    RunSpecifiedTests,
    RunLocalTests,
    RunAllTestsInOrg,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOptions {
    pub check_only: bool,
    pub rollback_on_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_level: Option<TestLevel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub run_tests: Vec<String>,
    pub perform_retrieve: bool,
    pub single_package: bool,
    pub ignore_warnings: bool,
    pub purge_on_delete: bool,
}

impl DeployOptions {
    /// Options used by the compile path: roll back on error, single package,
    /// and retrieve the deployed components for the index refresh.
    pub fn for_compile() -> Self {
        Self {
            rollback_on_error: true,
            single_package: true,
            perform_retrieve: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployStatus {
    #[default]
    Pending,
    InProgress,
    Succeeded,
    SucceededPartial,
    Failed,
    Canceling,
    Canceled,
}

/// One component outcome inside a deploy or tooling compile.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployMessage {
    #[serde(default)]
    pub component_type: Option<String>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(default)]
    pub problem_type: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub line_number: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub column_number: Option<u32>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub id: Option<String>,
}

impl fmt::Display for DeployMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.file_name.as_deref().unwrap_or(&self.full_name);
        write!(f, "{name}")?;
        if let Some(line) = self.line_number {
            write!(f, ":{line}")?;
            if let Some(col) = self.column_number {
                write!(f, ":{col}")?;
            }
        }
        if let Some(problem) = &self.problem {
            write!(f, " {problem}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCoverageWarning {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Status of a deploy job, with every list field normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    pub id: JobId,
    pub done: bool,
    pub success: bool,
    pub status: DeployStatus,
    pub check_only: bool,
    pub error_message: Option<String>,
    pub number_components_total: u32,
    pub number_components_deployed: u32,
    pub number_component_errors: u32,
    pub component_failures: Vec<DeployMessage>,
    pub component_successes: Vec<DeployMessage>,
    pub code_coverage_warnings: Vec<CodeCoverageWarning>,
    /// Present when the deploy ran with `perform_retrieve`.
    #[serde(skip)]
    pub retrieve_result: Option<RetrieveResult>,
}

impl DeployResult {
    /// Parse a REST `deployRequest` response. Accepts either the envelope
    /// (`{"id": …, "deployResult": {…}}`) or a bare deploy result.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RemoteError> {
        let inner = value.get("deployResult").unwrap_or(value);
        let wire: WireDeployResult = serde_json::from_value(inner.clone())?;
        let mut result = wire.into_result()?;
        if result.id.0.is_empty() {
            if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                result.id = JobId(id.to_owned());
            }
        }
        Ok(result)
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDeployResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    status: DeployStatus,
    #[serde(default)]
    check_only: bool,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    number_components_total: u32,
    #[serde(default)]
    number_components_deployed: u32,
    #[serde(default)]
    number_component_errors: u32,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    details: WireDeployDetails,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDeployDetails {
    #[serde_as(as = "DefaultOnNull<OneOrMany<_>>")]
    #[serde(default)]
    component_failures: Vec<DeployMessage>,
    #[serde_as(as = "DefaultOnNull<OneOrMany<_>>")]
    #[serde(default)]
    component_successes: Vec<DeployMessage>,
    #[serde(default)]
    run_test_result: Option<WireRunTestResult>,
    #[serde(default)]
    retrieve_result: Option<WireRetrieveResult>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRunTestResult {
    #[serde_as(as = "DefaultOnNull<OneOrMany<_>>")]
    #[serde(default)]
    code_coverage_warnings: Vec<CodeCoverageWarning>,
}

impl WireDeployResult {
    fn into_result(self) -> Result<DeployResult, RemoteError> {
        let retrieve_result = self
            .details
            .retrieve_result
            .map(WireRetrieveResult::into_result)
            .transpose()?;
        Ok(DeployResult {
            id: JobId(self.id.unwrap_or_default()),
            done: self.done,
            success: self.success,
            status: self.status,
            check_only: self.check_only,
            error_message: self.error_message,
            number_components_total: self.number_components_total,
            number_components_deployed: self.number_components_deployed,
            number_component_errors: self.number_component_errors,
            component_failures: self.details.component_failures,
            component_successes: self.details.component_successes,
            code_coverage_warnings: self
                .details
                .run_test_result
                .map(|r| r.code_coverage_warnings)
                .unwrap_or_default(),
            retrieve_result,
        })
    }
}

// ---------------------------------------------------------------------------
// Retrieve
// ---------------------------------------------------------------------------

/// Server-side properties of one retrieved file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProperties {
    pub full_name: String,
    pub file_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub id: Option<RemoteId>,
    #[serde(default, with = "crate::time::option")]
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by_id: Option<String>,
    #[serde(default)]
    pub last_modified_by_name: Option<String>,
    #[serde(default, with = "crate::time::option")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manageable_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveMessage {
    pub file_name: String,
    pub problem: String,
}

/// Status of a retrieve job. `zip_file` is only populated once `done`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveResult {
    pub id: JobId,
    pub done: bool,
    pub success: bool,
    pub status: String,
    pub error_message: Option<String>,
    pub file_properties: Vec<FileProperties>,
    pub messages: Vec<RetrieveMessage>,
    #[serde(skip)]
    pub zip_file: Option<Vec<u8>>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRetrieveResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde_as(as = "DefaultOnNull<OneOrMany<_>>")]
    #[serde(default)]
    file_properties: Vec<FileProperties>,
    #[serde_as(as = "DefaultOnNull<OneOrMany<_>>")]
    #[serde(default)]
    messages: Vec<RetrieveMessage>,
    #[serde(default)]
    zip_file: Option<String>,
}

impl WireRetrieveResult {
    fn into_result(self) -> Result<RetrieveResult, RemoteError> {
        let zip_file = self
            .zip_file
            .filter(|z| !z.is_empty())
            .map(|z| base64::engine::general_purpose::STANDARD.decode(z.as_bytes()))
            .transpose()?;
        Ok(RetrieveResult {
            id: JobId(self.id.unwrap_or_default()),
            done: self.done,
            success: self.success,
            status: self.status.unwrap_or_default(),
            error_message: self.error_message,
            file_properties: self.file_properties,
            messages: self.messages,
            zip_file,
        })
    }
}

// ---------------------------------------------------------------------------
// Tooling
// ---------------------------------------------------------------------------

/// One member row inside a metadata container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMember {
    /// e.g. `ApexClassMember`.
    pub member_type: String,
    pub container_id: RemoteId,
    pub content_entity_id: RemoteId,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveError {
    #[serde(default, alias = "errorCode")]
    pub status_code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Outcome of a single-record create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    #[serde(default)]
    pub id: Option<RemoteId>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<SaveError>,
}

impl SaveResult {
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.status_code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncRequestState {
    Queued,
    Completed,
    Failed,
    Error,
    Aborted,
    Invalidated,
}

impl AsyncRequestState {
    pub fn is_terminal(self) -> bool {
        self != AsyncRequestState::Queued
    }
}

/// Status of a container compile request with normalized diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncRequestStatus {
    pub id: RemoteId,
    pub state: AsyncRequestState,
    pub error_message: Option<String>,
    pub component_failures: Vec<DeployMessage>,
    pub component_successes: Vec<DeployMessage>,
}

impl AsyncRequestStatus {
    /// Parse a Tooling `ContainerAsyncRequest` record.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RemoteError> {
        let wire: WireAsyncRequest = serde_json::from_value(value.clone())?;
        let details = wire.deploy_details.unwrap_or_default();
        Ok(Self {
            id: wire.id,
            state: wire.state,
            error_message: wire.error_msg.filter(|m| !m.is_empty()),
            component_failures: details.component_failures,
            component_successes: details.component_successes,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireAsyncRequest {
    id: RemoteId,
    state: AsyncRequestState,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    deploy_details: Option<WireDeployDetails>,
}

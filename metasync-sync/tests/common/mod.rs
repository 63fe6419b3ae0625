//! Shared fixtures: a recording in-memory `MetadataApi` and project helpers.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;

use metasync_core::project::init_at;
use metasync_core::{DescribedType, PackageManifest, Project, ProjectSettings, RemoteId, SyncConfig};
use metasync_remote::{
    AsyncRequestState, AsyncRequestStatus, ContainerMember, DeployOptions, DeployResult,
    DeployStatus, FileProperties, JobId, MetadataApi, RemoteError, RetrieveResult, SaveError,
    SaveResult,
};
use metasync_sync::SyncContext;

#[derive(Default)]
struct StubState {
    calls: Vec<String>,
    deploys: Vec<(Vec<u8>, DeployOptions)>,
    retrieves: Vec<PackageManifest>,
    queries: Vec<String>,
    members: Vec<ContainerMember>,
    deploy_result: DeployResult,
    retrieve_result: RetrieveResult,
    query_records: Vec<Value>,
    failing_members: HashSet<RemoteId>,
    async_states: VecDeque<AsyncRequestState>,
    failing_calls: HashSet<String>,
}

/// Records every call; answers from canned results.
#[derive(Default)]
pub struct StubApi {
    state: Mutex<StubState>,
}

impl StubApi {
    pub fn new() -> Self {
        let stub = Self::default();
        stub.set_deploy_result(succeeded_deploy());
        stub.set_retrieve_result(RetrieveResult {
            done: true,
            success: true,
            ..RetrieveResult::default()
        });
        stub
    }

    pub fn set_deploy_result(&self, result: DeployResult) {
        self.state.lock().unwrap().deploy_result = result;
    }

    pub fn set_retrieve_result(&self, result: RetrieveResult) {
        self.state.lock().unwrap().retrieve_result = result;
    }

    pub fn set_query_records(&self, records: Vec<Value>) {
        self.state.lock().unwrap().query_records = records;
    }

    /// Reject the container member for this content entity.
    pub fn fail_member(&self, entity: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_members
            .insert(RemoteId::from(entity));
    }

    /// Async request states handed out in order; the last one repeats. With
    /// none configured the request stays `Queued` forever.
    pub fn set_async_states(&self, states: &[AsyncRequestState]) {
        self.state.lock().unwrap().async_states = states.iter().copied().collect();
    }

    /// Make every later `call` fail with an API error (still recorded).
    pub fn fail_call(&self, call: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_calls
            .insert(call.to_owned());
    }

    pub fn count(&self, call: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| *c == call)
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn deploys(&self) -> Vec<(Vec<u8>, DeployOptions)> {
        self.state.lock().unwrap().deploys.clone()
    }

    pub fn retrieves(&self) -> Vec<PackageManifest> {
        self.state.lock().unwrap().retrieves.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn members(&self) -> Vec<ContainerMember> {
        self.state.lock().unwrap().members.clone()
    }

    fn record(&self, call: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_owned());
        if state.failing_calls.contains(call) {
            return Err(RemoteError::Api {
                code: "UNKNOWN_EXCEPTION".into(),
                message: format!("{call} rejected"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataApi for StubApi {
    async fn describe(&self) -> Result<Vec<DescribedType>, RemoteError> {
        self.record("describe")?;
        Ok(Vec::new())
    }

    async fn submit_deploy(
        &self,
        archive: Vec<u8>,
        options: &DeployOptions,
    ) -> Result<JobId, RemoteError> {
        self.record("submit_deploy")?;
        self.state
            .lock()
            .unwrap()
            .deploys
            .push((archive, options.clone()));
        Ok(JobId::from("0Af000000000001"))
    }

    async fn check_deploy_status(&self, _job: &JobId) -> Result<DeployResult, RemoteError> {
        self.record("check_deploy_status")?;
        Ok(self.state.lock().unwrap().deploy_result.clone())
    }

    async fn submit_retrieve(&self, manifest: &PackageManifest) -> Result<JobId, RemoteError> {
        self.record("submit_retrieve")?;
        self.state.lock().unwrap().retrieves.push(manifest.clone());
        Ok(JobId::from("09S000000000001"))
    }

    async fn check_retrieve_status(&self, _job: &JobId) -> Result<RetrieveResult, RemoteError> {
        self.record("check_retrieve_status")?;
        Ok(self.state.lock().unwrap().retrieve_result.clone())
    }

    async fn query(&self, soql: &str) -> Result<Vec<Value>, RemoteError> {
        self.record("query")?;
        let mut state = self.state.lock().unwrap();
        state.queries.push(soql.to_owned());
        Ok(state.query_records.clone())
    }

    async fn tooling_query(&self, soql: &str) -> Result<Vec<Value>, RemoteError> {
        self.record("tooling_query")?;
        self.state.lock().unwrap().queries.push(soql.to_owned());
        Ok(Vec::new())
    }

    async fn create_container(&self, _name: &str) -> Result<RemoteId, RemoteError> {
        self.record("create_container")?;
        Ok(RemoteId::from("1dc000000000001"))
    }

    async fn delete_container(&self, _id: &RemoteId) -> Result<(), RemoteError> {
        self.record("delete_container")?;
        Ok(())
    }

    async fn create_member(&self, member: &ContainerMember) -> Result<SaveResult, RemoteError> {
        self.record("create_member")?;
        let mut state = self.state.lock().unwrap();
        state.members.push(member.clone());
        if state.failing_members.contains(&member.content_entity_id) {
            return Ok(SaveResult {
                id: None,
                success: false,
                errors: vec![SaveError {
                    status_code: "INVALID_FIELD".into(),
                    message: "Body cannot be saved".into(),
                    fields: vec!["Body".into()],
                }],
            });
        }
        Ok(SaveResult {
            id: Some(RemoteId::from(format!("400{}", state.members.len()))),
            success: true,
            errors: Vec::new(),
        })
    }

    async fn create_async_request(&self, _container: &RemoteId) -> Result<RemoteId, RemoteError> {
        self.record("create_async_request")?;
        Ok(RemoteId::from("1dr000000000001"))
    }

    async fn check_async_request(&self, id: &RemoteId) -> Result<AsyncRequestStatus, RemoteError> {
        self.record("check_async_request")?;
        let mut state = self.state.lock().unwrap();
        let current = if state.async_states.len() > 1 {
            state.async_states.pop_front()
        } else {
            state.async_states.front().copied()
        };
        Ok(AsyncRequestStatus {
            id: id.clone(),
            state: current.unwrap_or(AsyncRequestState::Queued),
            error_message: None,
            component_failures: Vec::new(),
            component_successes: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn succeeded_deploy() -> DeployResult {
    DeployResult {
        id: JobId::from("0Af000000000001"),
        done: true,
        success: true,
        status: DeployStatus::Succeeded,
        ..DeployResult::default()
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        api_version: "58.0".into(),
        poll_interval: Duration::from_secs(1),
        deploy_timeout: Duration::from_secs(30),
        tooling_timeout: Duration::from_secs(10),
        check_conflicts_before_compile: true,
    }
}

pub fn init_project(dir: &TempDir) -> Project {
    init_at(
        dir.path(),
        ProjectSettings::new("acme", "https://acme.my.example.com"),
    )
    .expect("init project")
}

/// A project-backed context over `stub`. Must be called inside a runtime.
pub fn context(dir: &TempDir, stub: &Arc<StubApi>) -> SyncContext {
    let project = init_project(dir);
    let api: Arc<dyn MetadataApi> = stub.clone();
    SyncContext::with_config(project, test_config(), api).expect("context")
}

/// Write `content` at `relative` under the project's source root.
pub fn write_source(dir: &TempDir, relative: &str, content: &str) {
    let path = dir.path().join("src").join(relative);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, content).expect("write source");
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

pub fn props(
    full_name: &str,
    type_name: &str,
    file_name: &str,
    id: &str,
    modified: DateTime<Utc>,
) -> FileProperties {
    FileProperties {
        full_name: full_name.into(),
        file_name: file_name.into(),
        type_name: type_name.into(),
        id: Some(RemoteId::from(id)),
        last_modified_date: Some(modified),
        last_modified_by_id: Some("005000000000001".into()),
        last_modified_by_name: None,
        created_date: None,
        manageable_state: None,
    }
}

pub fn apex_class(name: &str, id: &str, modified: DateTime<Utc>) -> FileProperties {
    props(name, "ApexClass", &format!("classes/{name}.cls"), id, modified)
}

/// Zip `(name, content)` pairs the way a retrieve response carries them.
pub fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).expect("start entry");
        writer.write_all(content.as_bytes()).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read file")
}

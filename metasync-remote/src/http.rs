//! Production [`MetadataApi`] over the platform's REST and SOAP endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use metasync_core::{DescribedType, OrgConnectionTarget, PackageManifest, RemoteId};

use crate::api::{
    AsyncRequestStatus, ContainerMember, DeployOptions, DeployResult, JobId, MetadataApi,
    RetrieveResult, SaveError, SaveResult,
};
use crate::error::RemoteError;
use crate::soap;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpMetadataClient {
    client: reqwest::Client,
    instance_url: String,
    access_token: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default)]
    next_records_url: Option<String>,
}

impl HttpMetadataClient {
    pub fn new(
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("metasync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let instance_url = instance_url.into().trim_end_matches('/').to_owned();
        let api_version = api_version.into();
        info!(instance = %instance_url, api_version = %api_version, "metadata client initialized");
        Ok(Self {
            client,
            instance_url,
            access_token: access_token.into(),
            api_version,
        })
    }

    /// Client for a secondary org connection. Fails when the target has no
    /// access token.
    pub fn for_target(target: &OrgConnectionTarget, api_version: &str) -> Result<Self, RemoteError> {
        let token = target
            .access_token
            .clone()
            .ok_or_else(|| RemoteError::Unauthorized(format!("no access token for '{}'", target.name)))?;
        Self::new(&target.instance_url, token, api_version)
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/services/data/v{}/{path}", self.instance_url, self.api_version)
    }

    fn tooling_url(&self, path: &str) -> String {
        self.data_url(&format!("tooling/{path}"))
    }

    fn soap_url(&self) -> String {
        format!("{}/services/Soap/m/{}", self.instance_url, self.api_version)
    }

    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Unauthorized(body));
        }
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, RemoteError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RemoteError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn soap_call(&self, action: &str, envelope: String) -> Result<Vec<u8>, RemoteError> {
        debug!(action, "SOAP request");
        let response = self
            .client
            .post(self.soap_url())
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", action)
            .body(envelope)
            .send()
            .await?;
        // Faults come back as HTTP 500 with a parseable body.
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        if status.is_success() || status == StatusCode::INTERNAL_SERVER_ERROR {
            return Ok(body);
        }
        Err(RemoteError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    async fn query_pages(&self, first: String) -> Result<Vec<Value>, RemoteError> {
        let mut records = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next {
            let page: QueryPage = serde_json::from_value(self.get_json(&url).await?)?;
            records.extend(page.records);
            next = page
                .next_records_url
                .map(|path| format!("{}{path}", self.instance_url));
        }
        Ok(records)
    }

    fn id_of(value: &Value) -> Result<RemoteId, RemoteError> {
        value
            .get("id")
            .and_then(Value::as_str)
            .map(RemoteId::from)
            .ok_or_else(|| RemoteError::Decode(format!("create response carries no id: {value}")))
    }
}

#[async_trait]
impl MetadataApi for HttpMetadataClient {
    async fn describe(&self) -> Result<Vec<DescribedType>, RemoteError> {
        let envelope = soap::describe_request(&self.access_token, &self.api_version);
        let body = self.soap_call("describeMetadata", envelope).await?;
        soap::parse_describe(&body)
    }

    async fn submit_deploy(
        &self,
        archive: Vec<u8>,
        options: &DeployOptions,
    ) -> Result<JobId, RemoteError> {
        let options_json = json!({ "deployOptions": options }).to_string();
        let form = Form::new()
            .part("json", Part::text(options_json).mime_str("application/json")?)
            .part(
                "file",
                Part::bytes(archive)
                    .file_name("deploy.zip")
                    .mime_str("application/zip")?,
            );
        let response = self
            .client
            .post(self.data_url("metadata/deployRequest"))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;
        let value: Value = Self::check(response).await?.json().await?;
        let id = Self::id_of(&value)?;
        info!(job = %id, "deploy submitted");
        Ok(JobId(id.0))
    }

    async fn check_deploy_status(&self, job: &JobId) -> Result<DeployResult, RemoteError> {
        let url = self.data_url(&format!("metadata/deployRequest/{job}?includeDetails=true"));
        DeployResult::from_json(&self.get_json(&url).await?)
    }

    async fn submit_retrieve(&self, manifest: &PackageManifest) -> Result<JobId, RemoteError> {
        let envelope = soap::retrieve_request(&self.access_token, &self.api_version, manifest);
        let body = self.soap_call("retrieve", envelope).await?;
        let job = soap::parse_retrieve_response(&body)?;
        info!(job = %job, "retrieve submitted");
        Ok(job)
    }

    async fn check_retrieve_status(&self, job: &JobId) -> Result<RetrieveResult, RemoteError> {
        let envelope = soap::check_retrieve_status_request(&self.access_token, job);
        let body = self.soap_call("checkRetrieveStatus", envelope).await?;
        soap::parse_retrieve_status(&body)
    }

    async fn query(&self, soql: &str) -> Result<Vec<Value>, RemoteError> {
        let url = reqwest::Url::parse_with_params(&self.data_url("query"), &[("q", soql)])
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.query_pages(url.into()).await
    }

    async fn tooling_query(&self, soql: &str) -> Result<Vec<Value>, RemoteError> {
        let url = reqwest::Url::parse_with_params(&self.tooling_url("query"), &[("q", soql)])
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.query_pages(url.into()).await
    }

    async fn create_container(&self, name: &str) -> Result<RemoteId, RemoteError> {
        let value = self
            .post_json(
                &self.tooling_url("sobjects/MetadataContainer"),
                &json!({ "Name": name }),
            )
            .await?;
        Self::id_of(&value)
    }

    async fn delete_container(&self, id: &RemoteId) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.tooling_url(&format!("sobjects/MetadataContainer/{id}")))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_member(&self, member: &ContainerMember) -> Result<SaveResult, RemoteError> {
        let body = json!({
            "MetadataContainerId": member.container_id,
            "ContentEntityId": member.content_entity_id,
            "Body": member.body,
        });
        let response = self
            .client
            .post(self.tooling_url(&format!("sobjects/{}", member.member_type)))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            // Validation failures come back as a list of errors.
            let errors: Vec<SaveError> = response.json().await?;
            return Ok(SaveResult {
                id: None,
                success: false,
                errors,
            });
        }
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_async_request(&self, container: &RemoteId) -> Result<RemoteId, RemoteError> {
        let value = self
            .post_json(
                &self.tooling_url("sobjects/ContainerAsyncRequest"),
                &json!({ "MetadataContainerId": container, "IsCheckOnly": false }),
            )
            .await?;
        Self::id_of(&value)
    }

    async fn check_async_request(&self, id: &RemoteId) -> Result<AsyncRequestStatus, RemoteError> {
        let value = self
            .get_json(&self.tooling_url(&format!("sobjects/ContainerAsyncRequest/{id}")))
            .await?;
        AsyncRequestStatus::from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_versioned() {
        let client =
            HttpMetadataClient::new("https://demo.my.salesforce.com/", "tok", "58.0").unwrap();
        assert_eq!(
            client.data_url("query"),
            "https://demo.my.salesforce.com/services/data/v58.0/query"
        );
        assert_eq!(
            client.tooling_url("sobjects/MetadataContainer"),
            "https://demo.my.salesforce.com/services/data/v58.0/tooling/sobjects/MetadataContainer"
        );
        assert_eq!(
            client.soap_url(),
            "https://demo.my.salesforce.com/services/Soap/m/58.0"
        );
    }

    #[test]
    fn target_without_token_is_rejected() {
        let target = OrgConnectionTarget {
            id: "1".into(),
            name: "qa".into(),
            instance_url: "https://qa.my.salesforce.com".into(),
            access_token: None,
            refresh_token: None,
        };
        let err = HttpMetadataClient::for_target(&target, "58.0").unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
    }

    #[test]
    fn create_response_id_is_extracted() {
        let id = HttpMetadataClient::id_of(&json!({"id": "1dc000000000001", "success": true})).unwrap();
        assert_eq!(id.0, "1dc000000000001");
        assert!(HttpMetadataClient::id_of(&json!({"success": false})).is_err());
    }
}

//! # metasync-remote
//!
//! The Remote Metadata API boundary.
//!
//! [`MetadataApi`] is the only surface the sync engine talks to. Every
//! long-running server job is exposed as an explicit submit / check pair;
//! callers own the polling loop and its timeout. [`HttpMetadataClient`] is
//! the production implementation over the platform's REST and SOAP
//! endpoints.

pub mod api;
pub mod error;
pub mod http;
pub mod soap;
pub mod time;

pub use api::{
    AsyncRequestState, AsyncRequestStatus, CodeCoverageWarning, ContainerMember, DeployMessage,
    DeployOptions, DeployResult, DeployStatus, FileProperties, JobId, MetadataApi, RetrieveMessage,
    RetrieveResult, SaveError, SaveResult, TestLevel,
};
pub use error::RemoteError;
pub use http::HttpMetadataClient;

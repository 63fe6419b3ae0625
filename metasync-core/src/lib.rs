//! metasync core library: type catalog, artifact classification, package
//! manifests, project settings, and org connection storage.
//!
//! Nothing in this crate performs network I/O. Filesystem access is limited
//! to the project's own settings documents under `<project>/.metasync/`.
//!
//! - [`catalog`]: [`TypeCatalog`] and [`ArtifactTypeDescriptor`]
//! - [`artifact`]: [`classify`] a path into a [`LocalArtifactReference`]
//! - [`manifest`]: [`PackageManifest`] XML model
//! - [`project`]: [`Project`] layout and settings persistence
//! - [`connections`]: [`OrgConnectionTarget`] CRUD
//! - [`config`]: layered [`SyncConfig`] snapshot

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod connections;
pub mod error;
pub mod manifest;
pub mod project;
pub mod types;

pub use artifact::{classify, Classification, LocalArtifactReference};
pub use catalog::{ArtifactTypeDescriptor, DescribedType, ToolingInfo, TypeCatalog};
pub use config::{GlobalConfig, SyncConfig};
pub use connections::{ConnectionUpdate, NewConnection, OrgConnectionTarget};
pub use error::{CatalogError, ManifestError, ProjectError};
pub use manifest::{Members, PackageManifest};
pub use project::{Project, ProjectSettings};
pub use types::{ArtifactKey, RemoteId};

//! # metasync-sync
//!
//! The synchronization engine: stages local artifacts, drives the bulk and
//! incremental remote paths, polls jobs under a timeout, and reconciles the
//! results into the Local Index and the project tree.
//!
//! Every entry point takes an explicit [`SyncContext`]; there is no global
//! state. The Local Index is owned by a single writer task reached through
//! [`LocalIndexHandle`].

pub mod bulk;
pub mod conflict;
pub mod context;
pub mod error;
pub mod index_writer;
pub mod local_index;
pub mod merge;
pub mod pipeline;
pub mod poll;
pub mod staging;
pub mod tooling;

pub use bulk::{RetrieveOptions, RetrieveOutcome};
pub use conflict::{Conflict, ConflictStatus};
pub use context::{ClientFactory, SyncContext};
pub use error::SyncError;
pub use index_writer::LocalIndexHandle;
pub use local_index::{IndexUpdate, LocalIndex, LocalIndexEntry, SyncState};
pub use merge::WriteResult;
pub use pipeline::{Intent, OperationDetails, OperationResult, TargetOutcome};
pub use staging::StagedPackage;
pub use tooling::{ContainerState, MemberFailure, ToolingCompileResult};

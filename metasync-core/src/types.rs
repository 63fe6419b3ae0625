//! Newtypes shared across the workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local Index key: `fullName + '.' + suffix` (or the bare full name for
/// suffix-less types).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(pub String);

impl ArtifactKey {
    pub fn new(full_name: &str, suffix: Option<&str>) -> Self {
        match suffix {
            Some(suffix) => Self(format!("{full_name}.{suffix}")),
            None => Self(full_name.to_owned()),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArtifactKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Server-assigned record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

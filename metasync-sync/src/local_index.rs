//! Local Index: last-known server properties per artifact.
//!
//! Persists a `LocalIndexFile` JSON document at
//! `<project>/.metasync/local_store.json`. Older flat documents (a bare
//! `{ key: entry }` map) are still accepted on load. Writes use the atomic
//! `.tmp` + rename pattern.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use metasync_core::{ArtifactKey, RemoteId, TypeCatalog};
use metasync_remote::FileProperties;

use crate::error::{io_err, SyncError};

/// File name of the manifest pseudo-entry returned by every retrieve.
const PACKAGE_PSEUDO_FILE: &str = "package.xml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Clean,
    Conflicted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIndexEntry {
    #[serde(default)]
    pub id: Option<RemoteId>,
    pub full_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub file_name: String,
    #[serde(with = "metasync_remote::time")]
    pub last_modified_date: DateTime<Utc>,
    #[serde(default)]
    pub last_modified_by_id: Option<String>,
    #[serde(default)]
    pub sync_state: SyncState,
}

/// Summary of one index mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexUpdate {
    pub upserted: usize,
    pub skipped: usize,
}

/// In-memory index, keyed by `fullName.suffix`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalIndex {
    entries: BTreeMap<ArtifactKey, LocalIndexEntry>,
}

/// On-disk payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalIndexFile {
    pub synced_at: DateTime<Utc>,
    pub entries: LocalIndex,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocalIndexCompat {
    Structured(LocalIndexStructuredCompat),
    Legacy(LocalIndex),
}

#[derive(Debug, Deserialize)]
struct LocalIndexStructuredCompat {
    synced_at: Option<DateTime<Utc>>,
    entries: LocalIndex,
}

impl LocalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ArtifactKey) -> Option<&LocalIndexEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactKey, &LocalIndexEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upsert one entry per file property record.
    ///
    /// Deterministic in (current state, input): the manifest pseudo-entry is
    /// skipped, unresolvable types and records without a modification date
    /// are logged and counted as skipped, and later records for the same key
    /// win.
    pub fn upsert_file_properties(
        &mut self,
        catalog: &TypeCatalog,
        properties: &[FileProperties],
    ) -> IndexUpdate {
        let mut update = IndexUpdate::default();
        for props in properties {
            if props.file_name == PACKAGE_PSEUDO_FILE
                || props.file_name.ends_with(&format!("/{PACKAGE_PSEUDO_FILE}"))
            {
                continue;
            }
            let Some(descriptor) = resolve_type(catalog, props) else {
                tracing::warn!(
                    file = %props.file_name,
                    type_name = %props.type_name,
                    "unresolvable artifact type; skipping index update"
                );
                update.skipped += 1;
                continue;
            };
            let Some(last_modified_date) = props.last_modified_date else {
                tracing::warn!(file = %props.file_name, "no lastModifiedDate; skipping index update");
                update.skipped += 1;
                continue;
            };
            let key = ArtifactKey::new(&props.full_name, descriptor.suffix.as_deref());
            self.entries.insert(
                key,
                LocalIndexEntry {
                    id: props.id.clone().filter(|id| !id.0.is_empty()),
                    full_name: props.full_name.clone(),
                    type_name: descriptor.xml_name.clone(),
                    file_name: props.file_name.clone(),
                    last_modified_date,
                    last_modified_by_id: props.last_modified_by_id.clone(),
                    sync_state: SyncState::Clean,
                },
            );
            update.upserted += 1;
        }
        update
    }

    /// Rebuild from a full retrieve.
    pub fn replace_all(
        &mut self,
        catalog: &TypeCatalog,
        properties: &[FileProperties],
    ) -> IndexUpdate {
        self.entries.clear();
        self.upsert_file_properties(catalog, properties)
    }

    /// Drop entries for artifacts deleted on the server. Returns how many
    /// were present.
    pub fn remove(&mut self, keys: &[ArtifactKey]) -> usize {
        keys.iter()
            .filter(|key| self.entries.remove(key).is_some())
            .count()
    }

    pub fn mark_conflicted(&mut self, key: &ArtifactKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.sync_state = SyncState::Conflicted;
                true
            }
            None => false,
        }
    }
}

/// Resolve by type name first, then by the file suffix.
fn resolve_type<'a>(
    catalog: &'a TypeCatalog,
    props: &FileProperties,
) -> Option<&'a metasync_core::ArtifactTypeDescriptor> {
    catalog.by_xml_name(&props.type_name).or_else(|| {
        let file = props.file_name.rsplit('/').next()?;
        let (_, suffix) = file.rsplit_once('.')?;
        catalog.by_suffix(suffix)
    })
}

/// Load the index at `path`. Returns an empty index if the file does not
/// yet exist.
pub fn load_at(path: &Path) -> Result<LocalIndexFile, SyncError> {
    if !path.exists() {
        return Ok(LocalIndexFile {
            synced_at: Utc::now(),
            entries: LocalIndex::new(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    match serde_json::from_str::<LocalIndexCompat>(&contents)? {
        LocalIndexCompat::Structured(store) => Ok(LocalIndexFile {
            synced_at: store.synced_at.unwrap_or_else(Utc::now),
            entries: store.entries,
        }),
        LocalIndexCompat::Legacy(entries) => Ok(LocalIndexFile {
            synced_at: Utc::now(),
            entries,
        }),
    }
}

/// Save the index atomically: `<path>.tmp` then rename.
pub fn save_at(path: &Path, index: &LocalIndex) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid local index path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let file = LocalIndexFile {
        synced_at: Utc::now(),
        entries: index.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

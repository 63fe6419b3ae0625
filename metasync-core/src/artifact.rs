//! Local artifact references, computed eagerly from a filesystem path.
//!
//! [`classify`] is a pure function of the path shape and the type catalog;
//! it never touches the filesystem. A reference is recomputed whenever it is
//! needed and passed around by value.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{ArtifactTypeDescriptor, TypeCatalog};
use crate::error::CatalogError;
use crate::manifest::WILDCARD;
use crate::types::ArtifactKey;

/// Suffix appended to the companion descriptor of an artifact.
pub const META_SUFFIX: &str = "-meta.xml";

/// Shape of a path relative to its type directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// `classes/Foo.cls`
    TopLevelFile,
    /// `classes`
    TopLevelDirectory,
    /// `reports/Sales/Pipeline.report`
    FolderItem,
    /// `reports/Sales`
    FolderContainer,
    /// `aura/MyCmp/MyCmpController.js`
    BundleItem,
    /// `aura/MyCmp`
    BundleContainer,
}

/// A local file or directory resolved against the type catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifactReference {
    pub path: PathBuf,
    /// `path` relative to the project's source root.
    pub relative_path: PathBuf,
    pub descriptor: ArtifactTypeDescriptor,
    /// Base name without suffix (bundle or folder name for containers).
    pub name: String,
    pub folder_name: Option<String>,
    pub classification: Classification,
    /// Member string used inside a package manifest.
    pub package_member_name: String,
    /// `true` when `path` is the `-meta.xml` companion descriptor.
    pub companion: bool,
}

impl LocalArtifactReference {
    pub fn xml_name(&self) -> &str {
        &self.descriptor.xml_name
    }

    /// Local Index key for this artifact.
    pub fn index_key(&self) -> ArtifactKey {
        ArtifactKey::new(&self.package_member_name, self.descriptor.suffix.as_deref())
    }

    /// Path of the primary (non-companion) file.
    pub fn primary_path(&self) -> PathBuf {
        if self.companion {
            strip_meta_suffix(&self.path)
        } else {
            self.path.clone()
        }
    }

    /// `<primary>-meta.xml`, whichever half of the pair this reference names.
    pub fn meta_path(&self) -> PathBuf {
        append_meta_suffix(&self.primary_path())
    }

    /// The other half of a file / companion-descriptor pair, if the type
    /// carries companion descriptors. Resolves in either direction.
    pub fn companion_path(&self) -> Option<PathBuf> {
        if !self.descriptor.has_companion_descriptor {
            return None;
        }
        match self.classification {
            Classification::TopLevelFile
            | Classification::FolderItem
            | Classification::FolderContainer => Some(if self.companion {
                strip_meta_suffix(&self.path)
            } else {
                append_meta_suffix(&self.path)
            }),
            _ => None,
        }
    }

    /// Eligible for the incremental compile path.
    pub fn is_tooling_eligible(&self) -> bool {
        self.descriptor.is_tooling_eligible()
            && !self.companion
            && self.classification == Classification::TopLevelFile
    }
}

/// Classify `path` (absolute, under `source_root`) into a reference.
pub fn classify(
    path: &Path,
    source_root: &Path,
    catalog: &TypeCatalog,
) -> Result<LocalArtifactReference, CatalogError> {
    let relative = path
        .strip_prefix(source_root)
        .map_err(|_| CatalogError::OutsideSourceRoot {
            path: path.to_path_buf(),
            root: source_root.to_path_buf(),
        })?
        .to_path_buf();
    let descriptor = catalog.resolve(&relative)?.clone();

    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let rest: Vec<String> = match components
        .iter()
        .position(|c| *c == descriptor.directory_name)
    {
        Some(idx) => components[idx + 1..].to_vec(),
        None => components.last().cloned().into_iter().collect(),
    };

    let unsupported = || CatalogError::UnsupportedShape {
        xml_name: descriptor.xml_name.clone(),
        path: relative.clone(),
    };

    let companion = rest.last().is_some_and(|last| last.ends_with(META_SUFFIX));
    let strip_name = |file: &str| base_name(file, descriptor.suffix.as_deref());

    let (classification, name, folder_name, member) = if rest.is_empty() {
        (
            Classification::TopLevelDirectory,
            descriptor.directory_name.clone(),
            None,
            WILDCARD.to_owned(),
        )
    } else if descriptor.bundle {
        let bundle = rest[0].clone();
        let classification = if rest.len() == 1 {
            Classification::BundleContainer
        } else {
            Classification::BundleItem
        };
        (classification, bundle.clone(), None, bundle)
    } else if descriptor.in_folder {
        match rest.len() {
            1 => {
                let folder = rest[0]
                    .strip_suffix(META_SUFFIX)
                    .unwrap_or(&rest[0])
                    .to_owned();
                (
                    Classification::FolderContainer,
                    folder.clone(),
                    Some(folder.clone()),
                    folder,
                )
            }
            2 => {
                let folder = rest[0].clone();
                let name = strip_name(&rest[1]);
                let member = format!("{folder}/{name}");
                (Classification::FolderItem, name, Some(folder), member)
            }
            _ => return Err(unsupported()),
        }
    } else if rest.len() == 1 {
        let name = strip_name(&rest[0]);
        (Classification::TopLevelFile, name.clone(), None, name)
    } else {
        return Err(unsupported());
    };

    Ok(LocalArtifactReference {
        path: path.to_path_buf(),
        relative_path: relative,
        descriptor,
        name,
        folder_name,
        classification,
        package_member_name: member,
        companion,
    })
}

/// Strip `-meta.xml`, then the type suffix. Suffix-less types keep the
/// full file name (documents keep their extension).
fn base_name(file: &str, suffix: Option<&str>) -> String {
    let file = file.strip_suffix(META_SUFFIX).unwrap_or(file);
    match suffix {
        Some(suffix) => file
            .strip_suffix(&format!(".{suffix}"))
            .unwrap_or(file)
            .to_owned(),
        None => file.to_owned(),
    }
}

fn strip_meta_suffix(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    PathBuf::from(s.strip_suffix(META_SUFFIX).unwrap_or(&s).to_owned())
}

fn append_meta_suffix(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}{META_SUFFIX}", path.display()))
}

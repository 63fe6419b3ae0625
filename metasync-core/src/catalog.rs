//! Static type catalog: maps an artifact type to its on-disk shape.
//!
//! # Resolution precedence
//!
//! A path relative to the source root resolves to exactly one descriptor:
//!
//! 1. by its first directory component (`classes/Foo.cls` → `ApexClass`)
//! 2. by file suffix (`Foo.cls` → `ApexClass`)
//! 3. by the folder-parent directory name (`<x>/MyFolder/doc.txt` → the
//!    in-folder type whose directory is `<x>`)
//!
//! The built-in table is loaded once; a server describe response may be
//! merged over it with [`TypeCatalog::with_describe`]. Catalogs are never
//! mutated after construction.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Marks a type as eligible for the incremental (tooling) compile path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolingInfo {
    /// Tooling sobject used for container members, e.g. `ApexClassMember`.
    pub member_type: String,
    /// Field carrying the artifact source, `Body` or `Markup`.
    pub body_field: String,
}

/// Immutable description of one artifact type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTypeDescriptor {
    pub xml_name: String,
    pub directory_name: String,
    pub suffix: Option<String>,
    pub in_folder: bool,
    pub has_companion_descriptor: bool,
    #[serde(default)]
    pub child_type_names: Vec<String>,
    /// One directory per artifact (aura / lwc bundles).
    #[serde(default)]
    pub bundle: bool,
    #[serde(default)]
    pub tooling: Option<ToolingInfo>,
}

impl ArtifactTypeDescriptor {
    pub fn is_tooling_eligible(&self) -> bool {
        self.tooling.is_some()
    }
}

/// One entry of a server describe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribedType {
    pub xml_name: String,
    pub directory_name: String,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub in_folder: bool,
    #[serde(default)]
    pub meta_file: bool,
    #[serde(default)]
    pub child_xml_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Built-in table
// ---------------------------------------------------------------------------

struct Builtin {
    xml_name: &'static str,
    directory: &'static str,
    suffix: Option<&'static str>,
    in_folder: bool,
    meta: bool,
    bundle: bool,
    children: &'static [&'static str],
    tooling: Option<(&'static str, &'static str)>,
}

const fn file_type(
    xml_name: &'static str,
    directory: &'static str,
    suffix: &'static str,
    meta: bool,
) -> Builtin {
    Builtin {
        xml_name,
        directory,
        suffix: Some(suffix),
        in_folder: false,
        meta,
        bundle: false,
        children: &[],
        tooling: None,
    }
}

const fn folder_type(
    xml_name: &'static str,
    directory: &'static str,
    suffix: Option<&'static str>,
    meta: bool,
) -> Builtin {
    Builtin {
        xml_name,
        directory,
        suffix,
        in_folder: true,
        meta,
        bundle: false,
        children: &[],
        tooling: None,
    }
}

const fn bundle_type(xml_name: &'static str, directory: &'static str) -> Builtin {
    Builtin {
        xml_name,
        directory,
        suffix: None,
        in_folder: false,
        meta: false,
        bundle: true,
        children: &[],
        tooling: None,
    }
}

const fn tooling_type(
    xml_name: &'static str,
    directory: &'static str,
    suffix: &'static str,
    member_type: &'static str,
    body_field: &'static str,
) -> Builtin {
    Builtin {
        xml_name,
        directory,
        suffix: Some(suffix),
        in_folder: false,
        meta: true,
        bundle: false,
        children: &[],
        tooling: Some((member_type, body_field)),
    }
}

const BUILTIN_TYPES: &[Builtin] = &[
    tooling_type("ApexClass", "classes", "cls", "ApexClassMember", "Body"),
    tooling_type("ApexTrigger", "triggers", "trigger", "ApexTriggerMember", "Body"),
    tooling_type("ApexPage", "pages", "page", "ApexPageMember", "Markup"),
    tooling_type("ApexComponent", "components", "component", "ApexComponentMember", "Markup"),
    file_type("StaticResource", "staticresources", "resource", true),
    Builtin {
        xml_name: "CustomObject",
        directory: "objects",
        suffix: Some("object"),
        in_folder: false,
        meta: false,
        bundle: false,
        children: &[
            "CustomField",
            "Index",
            "BusinessProcess",
            "CompactLayout",
            "RecordType",
            "WebLink",
            "ValidationRule",
            "SharingReason",
            "ListView",
            "FieldSet",
        ],
        tooling: None,
    },
    file_type("Layout", "layouts", "layout", false),
    file_type("Profile", "profiles", "profile", false),
    file_type("PermissionSet", "permissionsets", "permissionset", false),
    file_type("CustomTab", "tabs", "tab", false),
    Builtin {
        xml_name: "Workflow",
        directory: "workflows",
        suffix: Some("workflow"),
        in_folder: false,
        meta: false,
        bundle: false,
        children: &["WorkflowAlert", "WorkflowFieldUpdate", "WorkflowRule", "WorkflowTask"],
        tooling: None,
    },
    file_type("Flow", "flows", "flow", false),
    Builtin {
        xml_name: "CustomLabels",
        directory: "labels",
        suffix: Some("labels"),
        in_folder: false,
        meta: false,
        bundle: false,
        children: &["CustomLabel"],
        tooling: None,
    },
    file_type("RemoteSiteSetting", "remoteSiteSettings", "remoteSite", false),
    file_type("CustomApplication", "applications", "app", false),
    folder_type("Document", "documents", None, true),
    folder_type("EmailTemplate", "email", Some("email"), true),
    folder_type("Report", "reports", Some("report"), false),
    folder_type("Dashboard", "dashboards", Some("dashboard"), false),
    bundle_type("AuraDefinitionBundle", "aura"),
    bundle_type("LightningComponentBundle", "lwc"),
];

impl From<&Builtin> for ArtifactTypeDescriptor {
    fn from(b: &Builtin) -> Self {
        Self {
            xml_name: b.xml_name.to_owned(),
            directory_name: b.directory.to_owned(),
            suffix: b.suffix.map(str::to_owned),
            in_folder: b.in_folder,
            has_companion_descriptor: b.meta,
            child_type_names: b.children.iter().map(|c| (*c).to_owned()).collect(),
            bundle: b.bundle,
            tooling: b.tooling.map(|(member_type, body_field)| ToolingInfo {
                member_type: member_type.to_owned(),
                body_field: body_field.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TypeCatalog
// ---------------------------------------------------------------------------

/// Read-only lookup table of artifact types.
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    types: Vec<ArtifactTypeDescriptor>,
    by_xml_name: HashMap<String, usize>,
    by_directory: HashMap<String, usize>,
    by_suffix: HashMap<String, usize>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TypeCatalog {
    /// The fixed table compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_descriptors(BUILTIN_TYPES.iter().map(ArtifactTypeDescriptor::from).collect())
    }

    /// Build a catalog from explicit descriptors. On duplicate directory
    /// names or suffixes the first descriptor wins.
    pub fn from_descriptors(types: Vec<ArtifactTypeDescriptor>) -> Self {
        let mut by_xml_name = HashMap::new();
        let mut by_directory = HashMap::new();
        let mut by_suffix = HashMap::new();
        for (idx, ty) in types.iter().enumerate() {
            by_xml_name.entry(ty.xml_name.clone()).or_insert(idx);
            by_directory.entry(ty.directory_name.clone()).or_insert(idx);
            if let Some(suffix) = &ty.suffix {
                by_suffix.entry(suffix.clone()).or_insert(idx);
            }
        }
        Self {
            types,
            by_xml_name,
            by_directory,
            by_suffix,
        }
    }

    /// Merge a describe response over this catalog.
    ///
    /// Described fields replace the built-in ones; `bundle` and `tooling`
    /// are not part of the describe payload and are carried over for known
    /// types. Types only known locally are kept.
    pub fn with_describe(&self, described: &[DescribedType]) -> Self {
        let mut merged: Vec<ArtifactTypeDescriptor> = Vec::with_capacity(described.len());
        for d in described {
            let known = self.by_xml_name(&d.xml_name);
            merged.push(ArtifactTypeDescriptor {
                xml_name: d.xml_name.clone(),
                directory_name: d.directory_name.clone(),
                suffix: d.suffix.clone().filter(|s| !s.is_empty()),
                in_folder: d.in_folder,
                has_companion_descriptor: d.meta_file,
                child_type_names: d.child_xml_names.clone(),
                bundle: known.map(|k| k.bundle).unwrap_or(false),
                tooling: known.and_then(|k| k.tooling.clone()),
            });
        }
        for ty in &self.types {
            if !described.iter().any(|d| d.xml_name == ty.xml_name) {
                merged.push(ty.clone());
            }
        }
        Self::from_descriptors(merged)
    }

    pub fn by_xml_name(&self, xml_name: &str) -> Option<&ArtifactTypeDescriptor> {
        self.by_xml_name.get(xml_name).map(|&i| &self.types[i])
    }

    pub fn by_directory(&self, directory: &str) -> Option<&ArtifactTypeDescriptor> {
        self.by_directory.get(directory).map(|&i| &self.types[i])
    }

    pub fn by_suffix(&self, suffix: &str) -> Option<&ArtifactTypeDescriptor> {
        self.by_suffix.get(suffix).map(|&i| &self.types[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArtifactTypeDescriptor> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolve a path relative to the source root to its descriptor.
    pub fn resolve(&self, relative: &Path) -> Result<&ArtifactTypeDescriptor, CatalogError> {
        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let unresolvable = || CatalogError::UnresolvableType {
            path: relative.to_path_buf(),
        };

        if components.len() > 1 {
            if let Some(ty) = self.by_directory(&components[0]) {
                return Ok(ty);
            }
        }

        let file_name = components.last().ok_or_else(unresolvable)?;
        let base = file_name.strip_suffix("-meta.xml").unwrap_or(file_name);
        if let Some((_, ext)) = base.rsplit_once('.') {
            if let Some(ty) = self.by_suffix(ext) {
                return Ok(ty);
            }
        }

        if components.len() >= 3 {
            let folder_parent = &components[components.len() - 3];
            if let Some(ty) = self.by_directory(folder_parent).filter(|t| t.in_folder) {
                return Ok(ty);
            }
        }

        if components.len() == 1 {
            if let Some(ty) = self.by_directory(&components[0]) {
                return Ok(ty);
            }
        }

        Err(unresolvable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn builtin_lookups() {
        let catalog = TypeCatalog::builtin();
        let class = catalog.by_xml_name("ApexClass").expect("ApexClass");
        assert_eq!(class.directory_name, "classes");
        assert_eq!(class.suffix.as_deref(), Some("cls"));
        assert!(class.has_companion_descriptor);
        assert!(class.is_tooling_eligible());

        assert_eq!(catalog.by_suffix("page").unwrap().xml_name, "ApexPage");
        assert_eq!(catalog.by_directory("aura").unwrap().xml_name, "AuraDefinitionBundle");
        assert!(catalog.by_xml_name("CustomObject").unwrap().child_type_names.contains(&"CustomField".to_string()));
    }

    #[test]
    fn resolve_prefers_directory_name() {
        let catalog = TypeCatalog::builtin();
        // A `.page` file under classes/ still resolves by directory first.
        let ty = catalog.resolve(&PathBuf::from("classes/Odd.page")).unwrap();
        assert_eq!(ty.xml_name, "ApexClass");
    }

    #[test]
    fn resolve_falls_back_to_suffix_then_folder_parent() {
        let catalog = TypeCatalog::builtin();
        let ty = catalog.resolve(&PathBuf::from("elsewhere/Foo.cls-meta.xml")).unwrap();
        assert_eq!(ty.xml_name, "ApexClass");

        let catalog = TypeCatalog::from_descriptors(vec![ArtifactTypeDescriptor {
            xml_name: "Document".into(),
            directory_name: "documents".into(),
            suffix: None,
            in_folder: true,
            has_companion_descriptor: true,
            child_type_names: vec![],
            bundle: false,
            tooling: None,
        }]);
        let ty = catalog
            .resolve(&PathBuf::from("nested/documents/Shared/logo.png"))
            .unwrap();
        assert_eq!(ty.xml_name, "Document");
    }

    #[test]
    fn resolve_unknown_path_errors() {
        let catalog = TypeCatalog::builtin();
        let err = catalog.resolve(&PathBuf::from("nothing/here.xyz")).unwrap_err();
        assert!(matches!(err, CatalogError::UnresolvableType { .. }));
    }

    #[test]
    fn describe_override_keeps_local_only_flags() {
        let catalog = TypeCatalog::builtin();
        let merged = catalog.with_describe(&[DescribedType {
            xml_name: "ApexClass".into(),
            directory_name: "apexclasses".into(),
            suffix: Some("cls".into()),
            in_folder: false,
            meta_file: true,
            child_xml_names: vec![],
        }]);
        let class = merged.by_xml_name("ApexClass").unwrap();
        assert_eq!(class.directory_name, "apexclasses");
        assert!(class.tooling.is_some(), "tooling info survives describe merge");
        assert!(merged.by_directory("classes").is_none());
        assert!(merged.by_xml_name("LightningComponentBundle").unwrap().bundle);
        assert_eq!(merged.len(), catalog.len());
    }
}

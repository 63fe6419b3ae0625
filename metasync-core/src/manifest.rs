//! Package manifest model: `package.xml` / `destructiveChanges.xml`.
//!
//! # Document shape
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <Package xmlns="http://soap.sforce.com/2006/04/metadata">
//!     <types>
//!         <members>Foo</members>
//!         <name>ApexClass</name>
//!     </types>
//!     <version>58.0</version>
//! </Package>
//! ```
//!
//! Types are serialized in name order; member order is preserved as
//! inserted. A `*` member makes the whole type a wildcard, after which
//! insert/remove on that type are no-ops.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::artifact::LocalArtifactReference;
use crate::error::ManifestError;

pub const WILDCARD: &str = "*";
pub const METADATA_NAMESPACE: &str = "http://soap.sforce.com/2006/04/metadata";

/// Members subscribed for one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Members {
    /// Every member of the type.
    All,
    /// An ordered, duplicate-free list (possibly empty).
    Named(Vec<String>),
}

impl Members {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Members::All)
    }

    pub fn contains(&self, member: &str) -> bool {
        match self {
            Members::All => true,
            Members::Named(list) => list.iter().any(|m| m == member),
        }
    }
}

/// In-memory package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    types: BTreeMap<String, Members>,
    version: Option<String>,
}

impl PackageManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            types: BTreeMap::new(),
            version: Some(version.into()),
        }
    }

    /// Build an ephemeral manifest covering `artifacts`.
    pub fn from_artifacts<'a>(
        artifacts: impl IntoIterator<Item = &'a LocalArtifactReference>,
        version: Option<&str>,
    ) -> Self {
        let mut manifest = Self {
            types: BTreeMap::new(),
            version: version.map(str::to_owned),
        };
        for artifact in artifacts {
            manifest.insert_member(artifact.xml_name(), &artifact.package_member_name);
        }
        manifest
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    pub fn members(&self, xml_name: &str) -> Option<&Members> {
        self.types.get(xml_name)
    }

    pub fn types(&self) -> impl Iterator<Item = (&str, &Members)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `true` when no type subscribes to anything.
    pub fn is_empty(&self) -> bool {
        self.types.values().all(|m| match m {
            Members::All => false,
            Members::Named(list) => list.is_empty(),
        })
    }

    /// Number of explicitly named members (wildcards count as one).
    pub fn member_count(&self) -> usize {
        self.types
            .values()
            .map(|m| match m {
                Members::All => 1,
                Members::Named(list) => list.len(),
            })
            .sum()
    }

    pub fn insert(&mut self, artifacts: &[LocalArtifactReference]) {
        for artifact in artifacts {
            self.insert_member(artifact.xml_name(), &artifact.package_member_name);
        }
    }

    pub fn remove(&mut self, artifacts: &[LocalArtifactReference]) {
        for artifact in artifacts {
            self.remove_member(artifact.xml_name(), &artifact.package_member_name);
        }
    }

    /// Idempotent insert. Inserting `*` turns the type into a wildcard.
    /// Blank member names are ignored: they cannot survive a round trip.
    pub fn insert_member(&mut self, xml_name: &str, member: &str) {
        if member.trim().is_empty() {
            tracing::warn!(xml_name, "ignoring blank manifest member");
            return;
        }
        let entry = self
            .types
            .entry(xml_name.to_owned())
            .or_insert_with(|| Members::Named(Vec::new()));
        match entry {
            Members::All => {}
            Members::Named(_) if member == WILDCARD => *entry = Members::All,
            Members::Named(list) => {
                if !list.iter().any(|m| m == member) {
                    list.push(member.to_owned());
                }
            }
        }
    }

    /// Remove a member. An emptied type is kept as an empty list.
    pub fn remove_member(&mut self, xml_name: &str, member: &str) {
        if let Some(Members::Named(list)) = self.types.get_mut(xml_name) {
            list.retain(|m| m != member);
        }
    }

    /// Subscribe to a type without naming any members.
    pub fn subscribe(&mut self, xml_name: &str) {
        self.types
            .entry(xml_name.to_owned())
            .or_insert_with(|| Members::Named(Vec::new()));
    }

    // -----------------------------------------------------------------------
    // XML
    // -----------------------------------------------------------------------

    /// Parse a manifest document.
    pub fn deserialize(document: &[u8]) -> Result<Self, ManifestError> {
        let mut reader = Reader::from_reader(document);
        reader.trim_text(true);

        let mut manifest = PackageManifest::new();
        let mut buf = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut seen_root = false;
        let mut type_name: Option<String> = None;
        let mut type_members: Vec<String> = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if stack.is_empty() {
                        check_root(&name, seen_root)?;
                        seen_root = true;
                    } else if stack.len() == 1 && name == "types" {
                        type_name = None;
                        type_members.clear();
                    }
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if stack.is_empty() {
                        check_root(&name, seen_root)?;
                        seen_root = true;
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?.into_owned();
                    let path: Vec<&str> = stack.iter().map(String::as_str).collect();
                    match path.as_slice() {
                        [_, "types", "members"] => type_members.push(text),
                        [_, "types", "name"] => type_name = Some(text),
                        [_, "version"] => manifest.version = Some(text),
                        _ => {}
                    }
                }
                Event::End(_) => {
                    let closed = stack.pop();
                    if stack.len() == 1 && closed.as_deref() == Some("types") {
                        let name = type_name.take().ok_or_else(|| {
                            ManifestError::Malformed("<types> element without <name>".into())
                        })?;
                        manifest.subscribe(&name);
                        for member in type_members.drain(..) {
                            manifest.insert_member(&name, &member);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !seen_root {
            return Err(ManifestError::Malformed(
                "missing <Package> root element".into(),
            ));
        }
        if !stack.is_empty() {
            return Err(ManifestError::Malformed(format!(
                "unclosed element <{}>",
                stack.join("/")
            )));
        }
        Ok(manifest)
    }

    /// Serialize to a deterministic, indented document.
    pub fn serialize(&self) -> Result<Vec<u8>, ManifestError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("Package");
        root.push_attribute(("xmlns", METADATA_NAMESPACE));
        writer.write_event(Event::Start(root))?;

        for (name, members) in &self.types {
            writer.write_event(Event::Start(BytesStart::new("types")))?;
            match members {
                Members::All => write_text_element(&mut writer, "members", WILDCARD)?,
                Members::Named(list) => {
                    for member in list {
                        write_text_element(&mut writer, "members", member)?;
                    }
                }
            }
            write_text_element(&mut writer, "name", name)?;
            writer.write_event(Event::End(BytesEnd::new("types")))?;
        }
        if let Some(version) = &self.version {
            write_text_element(&mut writer, "version", version)?;
        }
        writer.write_event(Event::End(BytesEnd::new("Package")))?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::deserialize(&bytes)
    }

    /// Serialize and write atomically (`.tmp` sibling + rename).
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let io = |p: &Path, source| ManifestError::Io {
            path: p.to_path_buf(),
            source,
        };
        let bytes = self.serialize()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io(parent, e))?;
        }
        let tmp = path.with_extension("xml.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io(path, e))?;
        Ok(())
    }
}

fn check_root(name: &str, seen_root: bool) -> Result<(), ManifestError> {
    if seen_root {
        return Err(ManifestError::Malformed(format!(
            "unexpected second root element <{name}>"
        )));
    }
    if name != "Package" {
        return Err(ManifestError::Malformed(format!(
            "expected <Package> root element, found <{name}>"
        )));
    }
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    text: &str,
) -> Result<(), ManifestError> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

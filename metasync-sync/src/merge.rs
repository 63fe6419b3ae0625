//! Merge a retrieved package tree into the project source tree.
//!
//! Same-relative-path copy, not a three-way merge:
//!
//! 1. Walk the retrieved tree (the retrieve's own `package.xml` is skipped).
//! 2. SHA-256 the retrieved bytes and the current project file.
//! 3. Identical → `Unchanged`.
//! 4. Otherwise write `<path>.metasync.tmp` and rename over the target.
//!
//! Refresh always wins: no conflict check happens here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};
use crate::staging::{walk_files, PACKAGE_FILE};

/// Outcome of an individual file merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Project copy was missing or differed and has been replaced.
    Written { path: PathBuf },
    /// Project copy already matches the retrieved bytes.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::Unchanged { path } => path,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

pub(crate) fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Directory holding the package inside an unpacked retrieve. Multi-package
/// retrieves nest everything under `unpackaged/`.
pub fn package_root(retrieved: &Path) -> PathBuf {
    let nested = retrieved.join("unpackaged");
    if !retrieved.join(PACKAGE_FILE).exists() && nested.is_dir() {
        nested
    } else {
        retrieved.to_path_buf()
    }
}

/// Copy every retrieved file whose bytes differ into `source_root`.
pub fn merge_into_project(
    retrieved: &Path,
    source_root: &Path,
) -> Result<Vec<WriteResult>, SyncError> {
    let root = package_root(retrieved);
    let mut results = Vec::new();
    for relative in walk_files(&root, |p, e| io_err(p, e))? {
        if relative == Path::new(PACKAGE_FILE) {
            continue;
        }
        let incoming = std::fs::read(root.join(&relative)).map_err(|e| io_err(root.join(&relative), e))?;
        let target = source_root.join(&relative);
        results.push(replace_if_changed(&target, &incoming)?);
    }
    let written = results.iter().filter(|r| r.is_written()).count();
    tracing::info!(
        written,
        unchanged = results.len() - written,
        "merged retrieved files into project"
    );
    Ok(results)
}

fn replace_if_changed(path: &Path, content: &[u8]) -> Result<WriteResult, SyncError> {
    match std::fs::read(path) {
        Ok(existing) if digest(&existing) == digest(content) => {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(path, err)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = PathBuf::from(format!("{}.metasync.tmp", path.display()));
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn replaces_only_changed_files() {
        let retrieved = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(retrieved.path(), "package.xml", "<Package/>");
        write(retrieved.path(), "classes/Foo.cls", "remote foo");
        write(retrieved.path(), "classes/Bar.cls", "same bar");
        write(retrieved.path(), "pages/New.page", "<apex:page/>");
        write(project.path(), "package.xml", "<Package>project</Package>");
        write(project.path(), "classes/Foo.cls", "local foo");
        write(project.path(), "classes/Bar.cls", "same bar");

        let results = merge_into_project(retrieved.path(), project.path()).unwrap();
        let written: Vec<_> = results
            .iter()
            .filter(|r| r.is_written())
            .map(|r| r.path().strip_prefix(project.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            written,
            vec![PathBuf::from("classes/Foo.cls"), PathBuf::from("pages/New.page")]
        );
        assert_eq!(results.len(), 3);
        assert_eq!(
            std::fs::read_to_string(project.path().join("classes/Foo.cls")).unwrap(),
            "remote foo"
        );
        assert_eq!(
            std::fs::read_to_string(project.path().join("package.xml")).unwrap(),
            "<Package>project</Package>"
        );
        assert!(!project.path().join("classes/Foo.cls.metasync.tmp").exists());
    }

    #[test]
    fn nested_unpackaged_root_is_detected() {
        let retrieved = TempDir::new().unwrap();
        write(retrieved.path(), "unpackaged/package.xml", "<Package/>");
        write(retrieved.path(), "unpackaged/classes/Foo.cls", "x");
        assert_eq!(package_root(retrieved.path()), retrieved.path().join("unpackaged"));
    }
}

//! Staging & archive builder.
//!
//! A [`StagedPackage`] owns the temporary directory it was built in; dropping
//! it removes the directory on every exit path.

use std::ffi::OsStr;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use metasync_core::{Classification, LocalArtifactReference, PackageManifest};

use crate::error::{io_err, staging_err, SyncError};

pub const PACKAGE_FILE: &str = "package.xml";
pub const DESTRUCTIVE_CHANGES_FILE: &str = "destructiveChanges.xml";

/// A package tree in a temp dir plus its compressed archive.
#[derive(Debug)]
pub struct StagedPackage {
    dir: TempDir,
    archive: Vec<u8>,
    files: Vec<PathBuf>,
}

impl StagedPackage {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn archive(&self) -> &[u8] {
        &self.archive
    }

    /// Relative paths of every file in the package, manifest included.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Take the archive bytes and release the staging directory.
    pub fn into_archive(self) -> Vec<u8> {
        self.archive
    }
}

/// Stage `files` (absolute paths under `source_root`) with `manifest` at the
/// package root, then compress the tree.
pub fn stage(
    source_root: &Path,
    files: &[LocalArtifactReference],
    manifest: &PackageManifest,
) -> Result<StagedPackage, SyncError> {
    let dir = staging_dir()?;
    write_manifest(dir.path(), PACKAGE_FILE, manifest)?;

    for artifact in files {
        let primary = artifact.primary_path();
        copy_into(source_root, &primary, dir.path())?;
        if let Some(other) = artifact.companion_path() {
            // `other` is the primary when the reference is the descriptor.
            let descriptor_file = if artifact.companion {
                artifact.path.clone()
            } else {
                other
            };
            copy_into(source_root, &descriptor_file, dir.path())?;
        }
        if artifact.classification == Classification::BundleItem {
            // Bundles deploy as a unit.
            if let Some(bundle_dir) = bundle_root(artifact) {
                copy_into(source_root, &bundle_dir, dir.path())?;
            }
        }
    }
    finish(dir)
}

/// Stage the whole source tree under `manifest`.
pub fn stage_project(
    source_root: &Path,
    manifest: &PackageManifest,
) -> Result<StagedPackage, SyncError> {
    let dir = staging_dir()?;
    write_manifest(dir.path(), PACKAGE_FILE, manifest)?;
    let top_level = WalkDir::new(source_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in top_level {
        let entry = entry.map_err(|e| walk_err(source_root, e, |p, e| staging_err(p, e)))?;
        if entry.file_name() == OsStr::new(PACKAGE_FILE) {
            continue;
        }
        copy_into(source_root, entry.path(), dir.path())?;
    }
    finish(dir)
}

/// Stage a deletion: an empty `package.xml` plus `destructiveChanges.xml`
/// naming the artifacts to remove.
pub fn stage_delete(manifest: &PackageManifest) -> Result<StagedPackage, SyncError> {
    let dir = staging_dir()?;
    let mut empty = PackageManifest::new();
    if let Some(version) = manifest.version() {
        empty.set_version(version);
    }
    write_manifest(dir.path(), PACKAGE_FILE, &empty)?;
    write_manifest(dir.path(), DESTRUCTIVE_CHANGES_FILE, manifest)?;
    finish(dir)
}

fn staging_dir() -> Result<TempDir, SyncError> {
    tempfile::Builder::new()
        .prefix("metasync-stage-")
        .tempdir()
        .map_err(|e| staging_err(std::env::temp_dir(), e))
}

fn write_manifest(root: &Path, name: &str, manifest: &PackageManifest) -> Result<(), SyncError> {
    let path = root.join(name);
    fs::write(&path, manifest.serialize()?).map_err(|e| staging_err(&path, e))
}

pub(crate) fn bundle_root(artifact: &LocalArtifactReference) -> Option<PathBuf> {
    let mut dir = artifact.path.parent()?;
    while dir.file_name()? != artifact.name.as_str() {
        dir = dir.parent()?;
    }
    Some(dir.to_path_buf())
}

/// Copy `path` (file or directory) to the same relative location under
/// `staging_root`.
fn copy_into(source_root: &Path, path: &Path, staging_root: &Path) -> Result<(), SyncError> {
    if !path.starts_with(source_root) {
        return Err(staging_err(path, std::io::Error::other("outside the source root")));
    }
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_err(path, e, |p, e| staging_err(p, e)))?;
        let relative = entry
            .path()
            .strip_prefix(source_root)
            .map_err(|_| {
                staging_err(entry.path(), std::io::Error::other("outside the source root"))
            })?;
        let dest = staging_root.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| staging_err(&dest, e))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| staging_err(parent, e))?;
        }
        fs::copy(entry.path(), &dest).map_err(|e| staging_err(entry.path(), e))?;
    }
    Ok(())
}

/// Every file under `root`, relative to it, in sorted order.
pub(crate) fn walk_files(
    root: &Path,
    err: fn(PathBuf, std::io::Error) -> SyncError,
) -> Result<Vec<PathBuf>, SyncError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_err(root, e, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(out)
}

/// Attribute a walk failure to the entry that caused it, or to `root`.
fn walk_err(
    root: &Path,
    source: walkdir::Error,
    err: fn(PathBuf, std::io::Error) -> SyncError,
) -> SyncError {
    let path = source
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    err(path, source.into())
}

fn finish(dir: TempDir) -> Result<StagedPackage, SyncError> {
    let files = walk_files(dir.path(), |p, e| staging_err(p, e))?;
    let archive = compress(dir.path(), &files)?;
    tracing::debug!(
        dir = %dir.path().display(),
        files = files.len(),
        bytes = archive.len(),
        "package staged"
    );
    Ok(StagedPackage {
        dir,
        archive,
        files,
    })
}

fn compress(root: &Path, files: &[PathBuf]) -> Result<Vec<u8>, SyncError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for relative in files {
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let path = root.join(relative);
        let bytes = fs::read(&path).map_err(|e| staging_err(&path, e))?;
        writer.start_file(name, options)?;
        writer
            .write_all(&bytes)
            .map_err(zip::result::ZipError::from)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Decompress `archive` into `destination`. Entries whose names would land
/// outside `destination` are rejected.
pub fn unpack(archive: &[u8], destination: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut written = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(SyncError::UnsafeArchiveEntry {
                name: entry.name().to_owned(),
            });
        };
        let out = destination.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| io_err(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(zip::result::ZipError::from)?;
        fs::write(&out, bytes).map_err(|e| io_err(&out, e))?;
        written.push(relative);
    }
    written.sort();
    Ok(written)
}

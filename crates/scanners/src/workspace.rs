//! Request-scoped scratch workspaces: extraction, re-packaging, teardown.
//!
//! ## Ownership
//!
//! One workspace per in-flight request, uniquely named, never shared or
//! reused. The uploaded artifact is persisted inside the workspace, so the
//! teardown that is guaranteed on every exit path also removes it.
//!
//! ## Containment
//!
//! Archives are attacker-supplied. Two hard rules during extraction:
//!
//! - Every produced path must resolve inside the destination root. An entry
//!   (or link target) that would escape is a fatal `PathTraversal` error,
//!   never silently skipped.
//! - Decompressed output is bounded by a byte budget and an entry budget so
//!   a small archive cannot expand into an unbounded tree.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::ArtifactKind;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Policy decision: only tar (plain or gzip-compressed) and zip are
    /// accepted for extraction.
    #[error("unsupported archive kind: {0:?}")]
    Unsupported(ArtifactKind),

    #[error("archive entry escapes the extraction root: {}", .0.display())]
    PathTraversal(PathBuf),

    #[error("extraction exceeds the {limit} byte budget")]
    SizeLimit { limit: u64 },

    #[error("extraction exceeds the {limit} entry budget")]
    EntryLimit { limit: usize },

    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(err) => Self::Io(err),
            other => Self::Malformed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    pub max_bytes: u64,
    pub max_entries: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024 * 1024,
            max_entries: 50_000,
        }
    }
}

/// A scratch directory tree owned exclusively by one scan request.
///
/// `release` is the normal teardown path and logs (never raises) removal
/// failures; dropping the workspace covers panic unwinding.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(parent: &Path) -> io::Result<Self> {
        fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new().prefix("scan-").tempdir_in(parent)?;
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Persists uploaded bytes under the workspace root, stripping any
    /// directory components from the client-supplied name.
    pub fn persist_upload(&self, name: &str, content: &[u8]) -> io::Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "upload.bin".into());
        let dest = self.dir.path().join(file_name);
        fs::write(&dest, content)?;
        Ok(dest)
    }

    /// Subdirectory that archive contents are unpacked into.
    pub fn extraction_dir(&self) -> io::Result<PathBuf> {
        let dir = self.dir.path().join("extracted");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Destination for a repository checkout; the clone creates it.
    pub fn clone_dir(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Recursively deletes the scratch tree. Removal failure is logged and
    /// never raised over a completed scan's results.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Released workspace {}", path.display()),
            Err(err) => warn!("Failed to remove workspace {}: {}", path.display(), err),
        }
    }
}

/// Unpacks `archive` of the given kind into `dest`.
pub fn extract(
    archive: &Path,
    kind: ArtifactKind,
    dest: &Path,
    limits: ExtractLimits,
) -> Result<(), ExtractError> {
    info!("Extracting {} ({:?})", archive.display(), kind);
    match kind {
        ArtifactKind::ArchiveZip => extract_zip(archive, dest, limits),
        ArtifactKind::ArchiveTar => extract_tar(File::open(archive)?, dest, limits),
        ArtifactKind::ArchiveGzip => extract_tar(GzDecoder::new(File::open(archive)?), dest, limits),
        other => Err(ExtractError::Unsupported(other)),
    }
}

fn extract_tar<R: Read>(reader: R, dest: &Path, limits: ExtractLimits) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    let mut budget = ByteBudget::new(limits.max_bytes);
    let mut entries_seen = 0usize;

    for entry in archive.entries()? {
        let mut entry = entry?;
        entries_seen += 1;
        if entries_seen > limits.max_entries {
            return Err(ExtractError::EntryLimit {
                limit: limits.max_entries,
            });
        }

        let raw = entry.path()?.into_owned();
        let rel = sanitize_entry_path(&raw)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&rel);

        match entry.header().entry_type() {
            tar::EntryType::Directory => fs::create_dir_all(&target)?,
            tar::EntryType::Regular => {
                budget.charge(entry.header().size()?)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                let link = entry
                    .link_name()?
                    .ok_or_else(|| ExtractError::Malformed("link entry without target".into()))?;
                // A link target outside the root defeats containment just as
                // surely as a traversing entry path.
                sanitize_entry_path(&link)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry.unpack(&target)?;
            }
            other => debug!("Skipping tar entry type {:?}", other),
        }
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path, limits: ExtractLimits) -> Result<(), ExtractError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;

    if zip.len() > limits.max_entries {
        return Err(ExtractError::EntryLimit {
            limit: limits.max_entries,
        });
    }

    let mut budget = ByteBudget::new(limits.max_bytes);
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let rel = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => return Err(ExtractError::PathTraversal(PathBuf::from(entry.name()))),
        };
        let target = dest.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        let declared = entry.size();
        budget.charge(declared)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        // The declared size comes from the central directory; cap the
        // decompressed stream in case the header lies.
        let copied = io::copy(&mut (&mut entry).take(declared.saturating_add(1)), &mut out)?;
        if copied > declared {
            return Err(ExtractError::SizeLimit {
                limit: limits.max_bytes,
            });
        }
    }
    Ok(())
}

/// Re-serializes a scanned tree into a single deflate-compressed zip,
/// preserving paths relative to `src_dir`.
pub fn repackage(src_dir: &Path, zip_path: &Path) -> io::Result<()> {
    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(zip_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        writer
            .start_file(rel.to_string_lossy().replace('\\', "/"), options)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut input = File::open(entry.path())?;
        io::copy(&mut input, &mut writer)?;
    }

    writer
        .finish()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    info!(
        "Re-packaged {} into {}",
        src_dir.display(),
        zip_path.display()
    );
    Ok(())
}

/// Lexically normalizes an archive entry path, rejecting anything that
/// could resolve outside the extraction root. Returns an empty path for
/// entries that denote the root itself (`./`).
fn sanitize_entry_path(raw: &Path) -> Result<PathBuf, ExtractError> {
    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::PathTraversal(raw.to_path_buf()));
            }
        }
    }
    Ok(clean)
}

struct ByteBudget {
    remaining: u64,
    limit: u64,
}

impl ByteBudget {
    fn new(limit: u64) -> Self {
        Self {
            remaining: limit,
            limit,
        }
    }

    fn charge(&mut self, bytes: u64) -> Result<(), ExtractError> {
        if bytes > self.remaining {
            return Err(ExtractError::SizeLimit { limit: self.limit });
        }
        self.remaining -= bytes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rejects_parent_components() {
        assert!(matches!(
            sanitize_entry_path(Path::new("../evil.txt")),
            Err(ExtractError::PathTraversal(_))
        ));
        assert!(matches!(
            sanitize_entry_path(Path::new("nested/../../evil.txt")),
            Err(ExtractError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_sanitize_rejects_absolute_paths() {
        assert!(matches!(
            sanitize_entry_path(Path::new("/etc/passwd")),
            Err(ExtractError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_sanitize_normalizes_cur_dir() {
        let clean = sanitize_entry_path(Path::new("./a/./b.txt")).unwrap();
        assert_eq!(clean, PathBuf::from("a/b.txt"));
        assert!(sanitize_entry_path(Path::new("./"))
            .unwrap()
            .as_os_str()
            .is_empty());
    }

    #[test]
    fn test_byte_budget_exhaustion() {
        let mut budget = ByteBudget::new(10);
        budget.charge(6).unwrap();
        budget.charge(4).unwrap();
        assert!(matches!(
            budget.charge(1),
            Err(ExtractError::SizeLimit { limit: 10 })
        ));
    }

    #[test]
    fn test_workspace_release_removes_tree() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(parent.path()).unwrap();
        let upload = workspace.persist_upload("sample.txt", b"data").unwrap();
        assert!(upload.exists());
        let root = workspace.path().to_path_buf();
        workspace.release();
        assert!(!root.exists());
    }

    #[test]
    fn test_persist_upload_strips_directories() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(parent.path()).unwrap();
        let upload = workspace
            .persist_upload("../../etc/passwd", b"data")
            .unwrap();
        assert!(upload.starts_with(workspace.path()));
        assert_eq!(upload.file_name().unwrap(), "passwd");
        workspace.release();
    }
}

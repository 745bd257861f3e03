//! Archive I/O: scoped scratch directories, tar extraction and
//! deterministic sealing.
//!
//! Sealed archives are byte-reproducible: entries are emitted in sorted
//! path order with zeroed timestamps and ownership, and fixed modes.
//! The archive is written to a temporary file next to its destination and
//! renamed into place, so a failed seal never leaves a partial file at the
//! final path.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use a3s_delta_core::error::{DeltaError, Result};
use sha2::{Digest, Sha256};
use tar::{Builder, EntryType, Header};

/// Scratch directory removed when dropped, on every exit path.
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    /// Create a scratch directory under the system temp dir.
    pub fn new(label: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("a3s-delta-{}-", label))
            .tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create (if needed) and return a subdirectory.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).map_err(|e| DeltaError::io_at(&path, e))?;
        Ok(path)
    }
}

/// What happened at the destination when an archive was sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealOutcome {
    /// No archive existed; a new one was written.
    Written,
    /// An archive with different content was replaced.
    Replaced,
    /// An identical archive already existed and was kept.
    Unchanged,
}

impl std::fmt::Display for SealOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SealOutcome::Written => write!(f, "written"),
            SealOutcome::Replaced => write!(f, "replaced"),
            SealOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// How to treat an existing archive at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Keep an identical archive, fail on a different one.
    #[default]
    VerifyIdentical,
    /// Replace a different archive.
    Replace,
}

impl OverwritePolicy {
    pub fn from_flag(overwrite: bool) -> Self {
        if overwrite {
            OverwritePolicy::Replace
        } else {
            OverwritePolicy::VerifyIdentical
        }
    }
}

/// A sealed archive at its final path.
#[derive(Debug, Clone)]
pub struct SealedArchive {
    pub path: PathBuf,
    /// Hex SHA-256 of the archive bytes
    pub digest: String,
    pub size_bytes: u64,
    pub outcome: SealOutcome,
}

/// Unpack a tar archive into `dest`, creating it if needed.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| DeltaError::io_at(dest, e))?;

    let file = File::open(archive).map_err(|e| DeltaError::io_at(archive, e))?;
    let mut tar = tar::Archive::new(file);
    tar.unpack(dest).map_err(|e| DeltaError::io_at(archive, e))?;

    tracing::debug!(
        archive = %archive.display(),
        target = %dest.display(),
        "Extracted archive"
    );
    Ok(())
}

/// Write `src` as a deterministic tar stream into `writer`.
pub fn write_tree<W: Write>(src: &Path, writer: W) -> Result<W> {
    let mut builder = Builder::new(writer);
    builder.follow_symlinks(false);
    append_dir_sorted(&mut builder, src, Path::new(""))?;
    builder
        .into_inner()
        .map_err(|e| DeltaError::io_at(src, e))
}

fn append_dir_sorted<W: Write>(builder: &mut Builder<W>, root: &Path, rel: &Path) -> Result<()> {
    let dir = root.join(rel);
    let mut entries = std::fs::read_dir(&dir)
        .map_err(|e| DeltaError::io_at(&dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| DeltaError::io_at(&dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let rel_path = rel.join(entry.file_name());
        let abs_path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| DeltaError::io_at(&abs_path, e))?;

        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder
                .append_data(&mut header, &rel_path, std::io::empty())
                .map_err(|e| DeltaError::io_at(&abs_path, e))?;
            append_dir_sorted(builder, root, &rel_path)?;
        } else if file_type.is_symlink() {
            let target =
                std::fs::read_link(&abs_path).map_err(|e| DeltaError::io_at(&abs_path, e))?;
            header.set_entry_type(EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            builder
                .append_link(&mut header, &rel_path, &target)
                .map_err(|e| DeltaError::io_at(&abs_path, e))?;
        } else {
            let file = File::open(&abs_path).map_err(|e| DeltaError::io_at(&abs_path, e))?;
            let len = file
                .metadata()
                .map_err(|e| DeltaError::io_at(&abs_path, e))?
                .len();
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(len);
            builder
                .append_data(&mut header, &rel_path, file)
                .map_err(|e| DeltaError::io_at(&abs_path, e))?;
        }
    }
    Ok(())
}

/// Seal the directory `src` into a tar archive at `dest`.
///
/// The archive is built in a temporary file in `dest`'s directory. If `dest`
/// already exists, the new archive is compared to it by SHA-256: identical
/// content leaves the existing file untouched; different content fails with
/// `ArchiveExists` unless `policy` is `Replace`.
pub fn seal_tree(src: &Path, dest: &Path, policy: OverwritePolicy) -> Result<SealedArchive> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| DeltaError::io_at(&parent, e))?;

    let temp = tempfile::Builder::new()
        .prefix(".a3s-delta-")
        .suffix(".tar.tmp")
        .tempfile_in(&parent)
        .map_err(|e| DeltaError::io_at(&parent, e))?;

    let writer = write_tree(src, BufWriter::new(temp.as_file()))?;
    writer
        .into_inner()
        .map_err(|e| DeltaError::io_at(temp.path(), e.into_error()))?
        .sync_all()
        .map_err(|e| DeltaError::io_at(temp.path(), e))?;

    let digest = sha256_file(temp.path())?;
    let size_bytes = temp
        .as_file()
        .metadata()
        .map_err(|e| DeltaError::io_at(temp.path(), e))?
        .len();

    let outcome = if dest.exists() {
        let existing = sha256_file(dest)?;
        if existing == digest {
            tracing::info!(path = %dest.display(), %digest, "Archive unchanged");
            return Ok(SealedArchive {
                path: dest.to_path_buf(),
                digest,
                size_bytes,
                outcome: SealOutcome::Unchanged,
            });
        }
        if policy == OverwritePolicy::VerifyIdentical {
            return Err(DeltaError::ArchiveExists(dest.to_path_buf()));
        }
        SealOutcome::Replaced
    } else {
        SealOutcome::Written
    };

    temp.persist(dest)
        .map_err(|e| DeltaError::io_at(dest, e.error))?;

    tracing::debug!(
        path = %dest.display(),
        %digest,
        size_bytes,
        outcome = %outcome,
        "Sealed archive"
    );

    Ok(SealedArchive {
        path: dest.to_path_buf(),
        digest,
        size_bytes,
        outcome,
    })
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| DeltaError::io_at(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| DeltaError::io_at(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Copy a file, creating the destination's parent directory.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DeltaError::io_at(parent, e))?;
    }
    std::fs::copy(src, dst).map_err(|e| DeltaError::io_at(src, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("blobs/sha256")).unwrap();
        fs::write(dir.join("manifest.json"), "[]").unwrap();
        fs::write(dir.join("blobs/sha256/aaa"), "layer a").unwrap();
        fs::write(dir.join("blobs/sha256/bbb"), "layer b").unwrap();
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let path = {
            let scratch = ScratchDir::new("test").unwrap();
            let sub = scratch.subdir("nested/deeper").unwrap();
            fs::write(sub.join("f"), "x").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_seal_and_extract() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let extract = TempDir::new().unwrap();
        populate(src.path());

        let dest = out.path().join("image.tar");
        let sealed = seal_tree(src.path(), &dest, OverwritePolicy::VerifyIdentical).unwrap();
        assert_eq!(sealed.outcome, SealOutcome::Written);
        assert_eq!(sealed.size_bytes, fs::metadata(&dest).unwrap().len());

        extract_archive(&dest, extract.path()).unwrap();
        assert_eq!(
            fs::read_to_string(extract.path().join("blobs/sha256/aaa")).unwrap(),
            "layer a"
        );
        assert!(extract.path().join("manifest.json").is_file());
    }

    #[test]
    fn test_seal_is_deterministic() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        populate(a.path());
        // Same content, created in a different order
        fs::create_dir_all(b.path().join("blobs/sha256")).unwrap();
        fs::write(b.path().join("blobs/sha256/bbb"), "layer b").unwrap();
        fs::write(b.path().join("blobs/sha256/aaa"), "layer a").unwrap();
        fs::write(b.path().join("manifest.json"), "[]").unwrap();

        let policy = OverwritePolicy::default();
        let first = seal_tree(a.path(), &out.path().join("a.tar"), policy).unwrap();
        let second = seal_tree(b.path(), &out.path().join("b.tar"), policy).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(
            fs::read(out.path().join("a.tar")).unwrap(),
            fs::read(out.path().join("b.tar")).unwrap()
        );
    }

    #[test]
    fn test_reseal_identical_is_unchanged() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        populate(src.path());
        let dest = out.path().join("image.tar");

        seal_tree(src.path(), &dest, OverwritePolicy::VerifyIdentical).unwrap();
        let again = seal_tree(src.path(), &dest, OverwritePolicy::VerifyIdentical).unwrap();
        assert_eq!(again.outcome, SealOutcome::Unchanged);
    }

    #[test]
    fn test_reseal_different_refused_without_overwrite() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        populate(src.path());
        let dest = out.path().join("image.tar");
        seal_tree(src.path(), &dest, OverwritePolicy::VerifyIdentical).unwrap();
        let before = fs::read(&dest).unwrap();

        fs::write(src.path().join("blobs/sha256/ccc"), "layer c").unwrap();
        let err = seal_tree(src.path(), &dest, OverwritePolicy::VerifyIdentical).unwrap_err();
        assert!(matches!(err, DeltaError::ArchiveExists(_)));
        assert_eq!(fs::read(&dest).unwrap(), before);

        let replaced = seal_tree(src.path(), &dest, OverwritePolicy::Replace).unwrap();
        assert_eq!(replaced.outcome, SealOutcome::Replaced);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        populate(src.path());
        let dest = out.path().join("image.tar");
        seal_tree(src.path(), &dest, OverwritePolicy::VerifyIdentical).unwrap();
        seal_tree(src.path(), &dest, OverwritePolicy::VerifyIdentical).unwrap();

        let names: Vec<_> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("image.tar")]);
    }

    #[test]
    fn test_extract_missing_archive() {
        let dest = TempDir::new().unwrap();
        let err = extract_archive(Path::new("/nonexistent/x.tar"), dest.path()).unwrap_err();
        assert!(matches!(err, DeltaError::Io(_)));
    }

    #[test]
    fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

//! Diff archive builder.

use std::path::{Path, PathBuf};

use a3s_delta_core::error::{DeltaError, Result};
use tokio_util::sync::CancellationToken;

use super::{check_cancelled, diff_archive_name};
use crate::archive::{copy_file, seal_tree, OverwritePolicy, ScratchDir, SealedArchive};
use crate::lock::OutputLocks;
use crate::oci::tree::top_level_files;
use crate::oci::{
    diff, diff_record_name, DiffRecord, ImageTree, BLOB_DIR, CARRIED_FILES, REPOSITORIES_FILE,
};

/// A diff archive written to its final path.
#[derive(Debug, Clone)]
pub struct BuiltDiff {
    pub archive: SealedArchive,
    pub record: DiffRecord,
}

/// Packages the layers added between two versions into a diff archive.
///
/// The archive is assembled in scratch storage and only moved to
/// `<output_dir>/<image>_diff_<tag>.tar` once complete.
pub struct DiffArchiveBuilder {
    output_dir: PathBuf,
    policy: OverwritePolicy,
    locks: OutputLocks,
    cancel: CancellationToken,
}

impl DiffArchiveBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            policy: OverwritePolicy::default(),
            locks: OutputLocks::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share writer locks with other builders targeting the same directory.
    pub fn with_locks(mut self, locks: OutputLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Final path of the archive for `image` at `new_tag`.
    pub fn archive_path(&self, image: &str, new_tag: &str) -> PathBuf {
        self.output_dir.join(diff_archive_name(image, new_tag))
    }

    /// Diff two exported trees and build the archive.
    pub fn build_from_trees(
        &self,
        image: &str,
        new_tag: &str,
        old: &ImageTree,
        new: &ImageTree,
    ) -> Result<BuiltDiff> {
        let record = diff(old.layers(), new.layers());
        tracing::info!(
            image,
            tag = new_tag,
            added = record.added.len(),
            removed = record.removed.len(),
            "Compared layer sets"
        );
        self.build(image, new_tag, new, &record)
    }

    /// Build the archive for an already computed diff record.
    ///
    /// # Errors
    ///
    /// - `OutputBusy` if another build currently owns the archive path
    /// - `LayerIdInconsistency` if an added layer has no blob in `new`;
    ///   nothing is written in that case
    /// - `ArchiveExists` if a different archive is already at the final
    ///   path and the policy does not allow replacing it
    pub fn build(
        &self,
        image: &str,
        new_tag: &str,
        new: &ImageTree,
        record: &DiffRecord,
    ) -> Result<BuiltDiff> {
        let dest = self.archive_path(image, new_tag);
        let _guard = self.locks.acquire(&dest)?;

        for id in record.added.sorted() {
            if !new.has_blob(id) {
                return Err(DeltaError::LayerIdInconsistency {
                    layer: id.to_string(),
                    path: new.blob_path(id),
                });
            }
        }

        let scratch = ScratchDir::new("diff")?;
        let blob_dir = scratch.subdir(BLOB_DIR)?;

        for id in record.added.sorted() {
            check_cancelled(&self.cancel, "diff build")?;
            tracing::info!(image, tag = new_tag, layer = %id, "Layer is new or changed");
            copy_file(&new.blob_path(id), &blob_dir.join(id.as_str()))?;
        }

        copy_aux_files(new.root(), scratch.path())?;

        let record_path = scratch.path().join(diff_record_name(new_tag));
        std::fs::write(&record_path, record.to_json_bytes()?)
            .map_err(|e| DeltaError::io_at(&record_path, e))?;

        check_cancelled(&self.cancel, "diff build")?;
        tracing::info!(image, path = %dest.display(), "Creating diff archive");
        let archive = seal_tree(scratch.path(), &dest, self.policy)?;

        tracing::info!(
            image,
            path = %archive.path.display(),
            outcome = %archive.outcome,
            size_bytes = archive.size_bytes,
            "Diff archive ready"
        );

        Ok(BuiltDiff {
            archive,
            record: record.clone(),
        })
    }
}

/// Copy the new version's manifest and repositories record verbatim.
fn copy_aux_files(src_root: &Path, dst_root: &Path) -> Result<()> {
    let names = top_level_files(src_root)?;
    if !names.iter().any(|n| n == REPOSITORIES_FILE) {
        tracing::warn!(
            root = %src_root.display(),
            "Export has no repositories record; archive will carry the manifest only"
        );
    }
    for name in names {
        if !CARRIED_FILES.contains(&name.as_str()) {
            tracing::debug!(file = %name, "Leaving top-level file out of the diff archive");
            continue;
        }
        copy_file(&src_root.join(&name), &dst_root.join(&name))?;
    }
    Ok(())
}

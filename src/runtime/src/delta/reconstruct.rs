//! Reconstruction of a complete image from a diff archive and a baseline.
//!
//! The set of blobs the output must contain is taken from the target
//! manifest, never from the archive's file listing. An archive built against
//! a stale baseline therefore fails loudly instead of producing an image
//! with missing layers.

use std::path::{Path, PathBuf};

use a3s_delta_core::error::{DeltaError, Result};
use a3s_delta_core::event::{DeltaEvent, EventEmitter, Phase};
use tokio_util::sync::CancellationToken;

use super::{check_cancelled, diff_archive_name};
use crate::archive::{
    copy_file, extract_archive, seal_tree, OverwritePolicy, ScratchDir, SealedArchive,
};
use crate::lock::OutputLocks;
use crate::oci::tree::top_level_files;
use crate::oci::{
    diff_record_name, DiffRecord, ImageTree, LayerId, LayerSet, Manifest, BLOB_DIR, CARRIED_FILES,
    MANIFEST_FILE,
};

/// Prior version the target is reconstructed from.
#[derive(Debug, Clone)]
pub enum Baseline {
    /// Already unpacked export tree
    Tree(PathBuf),
    /// Exported archive (e.g. `docker save` output), unpacked during reconstruction
    Archive(PathBuf),
}

/// A reconstructed image archive.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub archive: SealedArchive,
    /// Diff record carried by the archive (informational)
    pub record: DiffRecord,
    /// Required blobs taken from the diff archive
    pub from_archive: usize,
    /// Required blobs copied from the baseline
    pub from_baseline: usize,
}

/// Rebuilds the full layer tree of a target version.
pub struct Reconstructor {
    release_dir: PathBuf,
    policy: OverwritePolicy,
    locks: OutputLocks,
    events: Option<EventEmitter>,
    cancel: CancellationToken,
}

impl Reconstructor {
    pub fn new(release_dir: impl Into<PathBuf>) -> Self {
        Self {
            release_dir: release_dir.into(),
            policy: OverwritePolicy::default(),
            locks: OutputLocks::new(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_locks(mut self, locks: OutputLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Emit a `reconstruct.phase` event on every phase transition.
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Final path of the reconstructed archive.
    pub fn release_path(&self, image: &str, new_tag: &str) -> PathBuf {
        self.release_dir.join(diff_archive_name(image, new_tag))
    }

    /// Reconstruct `image` at `new_tag` from `diff_archive` and `baseline`.
    ///
    /// # Errors
    ///
    /// - `IrreconcilableLayer` if a manifest-required layer is in neither the
    ///   archive nor the baseline; no release archive is written
    /// - `ManifestParseError` if the archive lacks a valid manifest or diff record
    /// - `NotAnImageTree` if the baseline has no blob storage
    /// - `OutputBusy`, `ArchiveExists`, `Cancelled`, `Io`
    pub fn reconstruct(
        &self,
        image: &str,
        new_tag: &str,
        diff_archive: &Path,
        baseline: &Baseline,
    ) -> Result<Reconstruction> {
        let mut phase = PhaseTracker::new(image, self.events.clone());
        let dest = self.release_path(image, new_tag);
        let _guard = self.locks.acquire(&dest)?;

        if !diff_archive.is_file() {
            return Err(DeltaError::io_at(
                diff_archive,
                std::io::Error::new(std::io::ErrorKind::NotFound, "diff archive does not exist"),
            ));
        }

        let scratch = ScratchDir::new("apply")?;
        let target = scratch.subdir("target")?;
        let target_blobs = scratch.subdir(&format!("target/{}", BLOB_DIR))?;

        // 1. Unpack the diff archive; take its manifest and the blobs it requires
        check_cancelled(&self.cancel, "reconstruction")?;
        phase.advance(Phase::ExtractingArchive);
        let unpacked = scratch.subdir("diff")?;
        tracing::info!(image, archive = %diff_archive.display(), "Extracting diff archive");
        extract_archive(diff_archive, &unpacked)?;

        let manifest = Manifest::from_file(&unpacked.join(MANIFEST_FILE))?;
        let record = DiffRecord::from_file(&unpacked.join(diff_record_name(new_tag)))?;
        let required = manifest.required();
        tracing::debug!(
            image,
            tags = ?manifest.repo_tags(),
            required = required.len(),
            "Read target manifest"
        );

        let archive_blobs = blobs_present(&unpacked.join(BLOB_DIR))?;
        for id in record.added.sorted() {
            if !archive_blobs.contains(id) {
                tracing::warn!(
                    image,
                    layer = %id,
                    "Layer recorded as added is missing from the diff archive"
                );
            }
        }

        let mut materialized = LayerSet::new();
        for id in archive_blobs.sorted() {
            if !required.contains(id) {
                tracing::warn!(
                    image,
                    layer = %id,
                    "Ignoring archive blob not referenced by the manifest"
                );
                continue;
            }
            copy_file(&unpacked.join(BLOB_DIR).join(id.as_str()), &target_blobs.join(id.as_str()))?;
            materialized.insert(id.clone());
        }
        copy_file(&unpacked.join(MANIFEST_FILE), &target.join(MANIFEST_FILE))?;
        let from_archive = materialized.len();

        // 2. Open the baseline
        check_cancelled(&self.cancel, "reconstruction")?;
        phase.advance(Phase::ExtractingBaseline);
        let baseline_tree = match baseline {
            Baseline::Tree(path) => ImageTree::open(path)?,
            Baseline::Archive(path) => {
                let dir = scratch.subdir("baseline")?;
                tracing::info!(image, archive = %path.display(), "Extracting baseline image");
                extract_archive(path, &dir)?;
                ImageTree::open(&dir)?
            }
        };

        // 3. Fill in every required layer the archive did not carry
        phase.advance(Phase::Reconciling);
        tracing::info!(image, required = required.len(), "Checking for missing layers");
        let mut from_baseline = 0;
        for id in required.sorted() {
            check_cancelled(&self.cancel, "reconstruction")?;
            if materialized.contains(id) {
                continue;
            }
            if baseline_tree.layers().contains(id) && baseline_tree.has_blob(id) {
                tracing::info!(
                    image,
                    layer = %id,
                    "Layer not in diff archive, copying from baseline"
                );
                copy_file(&baseline_tree.blob_path(id), &target_blobs.join(id.as_str()))?;
                materialized.insert(id.clone());
                from_baseline += 1;
            } else {
                tracing::error!(
                    image,
                    layer = %id,
                    "Layer missing from both diff archive and baseline"
                );
                phase.advance(Phase::Failed);
                return Err(DeltaError::IrreconcilableLayer {
                    layer: id.to_string(),
                });
            }
        }

        // 4. Auxiliary records: archive first, then baseline, never overwriting
        copy_missing_aux(&unpacked, &target)?;
        copy_missing_aux(baseline_tree.root(), &target)?;

        verify_complete(&target_blobs, &required)?;

        // 5. Seal
        check_cancelled(&self.cancel, "reconstruction")?;
        phase.advance(Phase::Sealing);
        tracing::info!(image, path = %dest.display(), "Creating release archive");
        let archive = seal_tree(&target, &dest, self.policy)?;
        phase.advance(Phase::Done);

        tracing::info!(
            image,
            path = %archive.path.display(),
            from_archive,
            from_baseline,
            outcome = %archive.outcome,
            "Image reconstructed"
        );

        Ok(Reconstruction {
            archive,
            record,
            from_archive,
            from_baseline,
        })
    }
}

/// Tracks the reconstruction state machine and publishes transitions.
struct PhaseTracker {
    image: String,
    current: Phase,
    events: Option<EventEmitter>,
}

impl PhaseTracker {
    fn new(image: &str, events: Option<EventEmitter>) -> Self {
        let tracker = Self {
            image: image.to_string(),
            current: Phase::Start,
            events,
        };
        tracker.publish();
        tracker
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.current.can_advance_to(next),
            "illegal phase transition {} -> {}",
            self.current,
            next
        );
        self.current = next;
        tracing::debug!(image = %self.image, phase = %next, "Reconstruction phase");
        self.publish();
    }

    fn publish(&self) {
        if let Some(events) = &self.events {
            events.emit(DeltaEvent::phase(&self.image, self.current));
        }
    }
}

/// Layer IDs of the blob files in `dir`; empty if the directory is absent.
fn blobs_present(dir: &Path) -> Result<LayerSet> {
    if !dir.is_dir() {
        return Ok(LayerSet::new());
    }
    let mut set = LayerSet::new();
    for name in top_level_files(dir)? {
        match LayerId::new(&name) {
            Ok(id) => {
                set.insert(id);
            }
            Err(_) => tracing::warn!(blob = %name, "Skipping blob with invalid name"),
        }
    }
    Ok(set)
}

/// Copy the carried top-level records from `src` that `dst` lacks.
fn copy_missing_aux(src: &Path, dst: &Path) -> Result<()> {
    for name in CARRIED_FILES {
        let source = src.join(name);
        let target = dst.join(name);
        if target.exists() || !source.is_file() {
            continue;
        }
        copy_file(&source, &target)?;
    }
    Ok(())
}

/// The target blob directory must hold exactly the required set.
fn verify_complete(target_blobs: &Path, required: &LayerSet) -> Result<()> {
    let present = blobs_present(target_blobs)?;
    if let Some(missing) = required.difference(&present).sorted().first() {
        return Err(DeltaError::IrreconcilableLayer {
            layer: missing.to_string(),
        });
    }
    if let Some(extra) = present.difference(required).sorted().first() {
        return Err(DeltaError::LayerIdInconsistency {
            layer: extra.to_string(),
            path: target_blobs.join(extra.as_str()),
        });
    }
    Ok(())
}

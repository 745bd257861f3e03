//! Worklist driver for the `generate` and `apply` modes.
//!
//! Each entry is independent: a failing entry is logged and reported, and
//! the run continues with the next one. Entries run on a bounded pool of
//! blocking workers; reports come back in worklist order.

use std::path::Path;
use std::sync::Arc;

use a3s_delta_core::config::DeltaConfig;
use a3s_delta_core::error::{DeltaError, Result};
use a3s_delta_core::event::{events, DeltaEvent, EventEmitter};
use a3s_delta_core::worklist::{ImageEntry, WorkList};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::archive::{extract_archive, OverwritePolicy, ScratchDir, SealedArchive};
use crate::delta::{
    check_cancelled, diff_archive_name, Baseline, BuiltDiff, DiffArchiveBuilder, Reconstruction,
    Reconstructor,
};
use crate::engine::{image_ref, ContainerEngine};
use crate::lock::OutputLocks;
use crate::oci::ImageTree;

/// Which side of the transfer a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Build diff archives on the connected side
    Generate,
    /// Reconstruct full images on the target side
    Apply,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Generate => write!(f, "generate"),
            Mode::Apply => write!(f, "apply"),
        }
    }
}

/// Result of a successful entry.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Generated(BuiltDiff),
    Applied {
        reconstruction: Reconstruction,
        loaded: bool,
    },
}

impl EntryOutcome {
    /// The archive the entry produced.
    pub fn archive(&self) -> &SealedArchive {
        match self {
            EntryOutcome::Generated(built) => &built.archive,
            EntryOutcome::Applied { reconstruction, .. } => &reconstruction.archive,
        }
    }
}

/// Outcome of one worklist entry.
#[derive(Debug)]
pub struct EntryReport {
    /// Human-readable entry label
    pub label: String,
    /// Validated entry; `None` when the entry itself was malformed
    pub entry: Option<ImageEntry>,
    pub result: Result<EntryOutcome>,
}

impl EntryReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// All entry reports of a run, in worklist order.
#[derive(Debug)]
pub struct RunSummary {
    pub mode: Mode,
    pub reports: Vec<EntryReport>,
}

impl RunSummary {
    pub fn succeeded_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    /// Failed entries, including malformed ones.
    pub fn failed_count(&self) -> usize {
        self.reports.len() - self.succeeded_count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Drives diff generation and reconstruction over a worklist.
#[derive(Clone)]
pub struct DeltaPipeline {
    config: DeltaConfig,
    engine: Arc<dyn ContainerEngine>,
    locks: OutputLocks,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl DeltaPipeline {
    pub fn new(config: DeltaConfig, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            config,
            engine,
            locks: OutputLocks::new(),
            events: EventEmitter::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &DeltaConfig {
        &self.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Token that stops the run at the next phase boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn policy(&self) -> OverwritePolicy {
        OverwritePolicy::from_flag(self.config.overwrite)
    }

    fn builder(&self) -> DiffArchiveBuilder {
        DiffArchiveBuilder::new(&self.config.output_dir)
            .with_policy(self.policy())
            .with_locks(self.locks.clone())
            .with_cancel(self.cancel.clone())
    }

    fn reconstructor(&self) -> Reconstructor {
        Reconstructor::new(&self.config.release_dir)
            .with_policy(self.policy())
            .with_locks(self.locks.clone())
            .with_events(self.events.clone())
            .with_cancel(self.cancel.clone())
    }

    /// Create or check the directories a mode works in.
    ///
    /// `generate` creates the output directory. `apply` creates the release
    /// directory and requires the output directory (holding the transferred
    /// diff archives) to exist.
    pub fn prepare(&self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Generate => create_dir(&self.config.output_dir),
            Mode::Apply => {
                if !self.config.output_dir.is_dir() {
                    return Err(DeltaError::Config(format!(
                        "diff archive directory {} does not exist",
                        self.config.output_dir.display()
                    )));
                }
                create_dir(&self.config.release_dir)
            }
        }
    }

    /// Export both versions and build the diff archive for `entry`.
    pub fn generate_entry(&self, entry: &ImageEntry) -> Result<BuiltDiff> {
        let scratch = ScratchDir::new("generate")?;
        let old = self.export_tree(&scratch, &entry.image, &entry.old_version, "old")?;
        let new = self.export_tree(&scratch, &entry.image, &entry.new_version, "new")?;

        check_cancelled(&self.cancel, "diff generation")?;
        self.builder()
            .build_from_trees(&entry.image, &entry.new_version, &old, &new)
    }

    /// Reconstruct the new version of `entry` from its diff archive and the
    /// locally available old version. Returns whether the result was loaded
    /// into the engine.
    pub fn apply_entry(&self, entry: &ImageEntry) -> Result<(Reconstruction, bool)> {
        let archive = self
            .config
            .output_dir
            .join(diff_archive_name(&entry.image, &entry.new_version));
        if !archive.is_file() {
            return Err(DeltaError::io_at(
                &archive,
                std::io::Error::new(std::io::ErrorKind::NotFound, "diff archive not found"),
            ));
        }

        let scratch = ScratchDir::new("baseline")?;
        let baseline = scratch.path().join("baseline.tar");
        self.engine.pull(&entry.image, &entry.old_version)?;
        check_cancelled(&self.cancel, "baseline export")?;
        self.engine
            .export(&entry.image, &entry.old_version, &baseline)?;

        let reconstruction = self.reconstructor().reconstruct(
            &entry.image,
            &entry.new_version,
            &archive,
            &Baseline::Archive(baseline),
        )?;

        let loaded = if self.config.load_after_apply {
            self.engine.load(&reconstruction.archive.path)?;
            tracing::info!(
                image = %image_ref(&entry.image, &entry.new_version),
                "Loaded new release into engine"
            );
            true
        } else {
            false
        };

        Ok((reconstruction, loaded))
    }

    /// Run a single entry, emitting entry events around it.
    pub fn run_entry(&self, mode: Mode, entry: &ImageEntry) -> Result<EntryOutcome> {
        self.events.emit(DeltaEvent::with_string(
            events::ENTRY_STARTED,
            &entry.image,
            mode.to_string(),
        ));
        tracing::info!(
            mode = %mode,
            image = %entry.image,
            old = %entry.old_version,
            new = %entry.new_version,
            "Processing entry"
        );

        let result = check_cancelled(&self.cancel, "entry").and_then(|()| match mode {
            Mode::Generate => self.generate_entry(entry).map(EntryOutcome::Generated),
            Mode::Apply => self
                .apply_entry(entry)
                .map(|(reconstruction, loaded)| EntryOutcome::Applied {
                    reconstruction,
                    loaded,
                }),
        });

        match &result {
            Ok(outcome) => {
                self.events.emit(DeltaEvent::with_string(
                    events::ENTRY_COMPLETED,
                    &entry.image,
                    outcome.archive().path.display().to_string(),
                ));
            }
            Err(e) => {
                tracing::error!(
                    image = %entry.image,
                    old = %entry.old_version,
                    new = %entry.new_version,
                    error = %e,
                    "Entry failed"
                );
                self.events.emit(DeltaEvent::with_string(
                    events::ENTRY_FAILED,
                    &entry.image,
                    e.to_string(),
                ));
            }
        }
        result
    }

    /// Process every worklist entry with at most `workers` in flight.
    ///
    /// Only directory preparation can fail the run as a whole; entry
    /// failures are collected into the summary.
    pub async fn run(&self, mode: Mode, worklist: &WorkList) -> Result<RunSummary> {
        self.prepare(mode)?;

        enum Pending {
            Ready(EntryReport),
            Running(ImageEntry, tokio::task::JoinHandle<Result<EntryOutcome>>),
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut pending = Vec::with_capacity(worklist.entries.len());

        for (index, validated) in worklist.validated().into_iter().enumerate() {
            let entry = match validated {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(entry = index + 1, error = %e, "Skipping invalid entry");
                    pending.push(Pending::Ready(EntryReport {
                        label: format!("entry #{}", index + 1),
                        entry: None,
                        result: Err(e),
                    }));
                    continue;
                }
            };

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DeltaError::Config(format!("worker pool closed: {}", e)))?;
            let pipeline = self.clone();
            let task_entry = entry.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                pipeline.run_entry(mode, &task_entry)
            });
            pending.push(Pending::Running(entry, handle));
        }

        let mut reports = Vec::with_capacity(pending.len());
        for item in pending {
            let report = match item {
                Pending::Ready(report) => report,
                Pending::Running(entry, handle) => {
                    let result = handle.await.unwrap_or_else(|e| {
                        Err(DeltaError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("worker task failed: {}", e),
                        )))
                    });
                    EntryReport {
                        label: entry.to_string(),
                        entry: Some(entry),
                        result,
                    }
                }
            };
            reports.push(report);
        }

        let summary = RunSummary { mode, reports };
        tracing::info!(
            mode = %mode,
            succeeded = summary.succeeded_count(),
            failed = summary.failed_count(),
            "Run finished"
        );
        Ok(summary)
    }

    fn export_tree(
        &self,
        scratch: &ScratchDir,
        image: &str,
        tag: &str,
        label: &str,
    ) -> Result<ImageTree> {
        check_cancelled(&self.cancel, "image export")?;
        self.engine.pull(image, tag)?;
        let tar = scratch.path().join(format!("{}.tar", label));
        self.engine.export(image, tag, &tar)?;

        let dir = scratch.subdir(label)?;
        extract_archive(&tar, &dir)?;
        ImageTree::open(&dir)
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| DeltaError::io_at(path, e))
}

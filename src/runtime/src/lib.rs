//! A3S Delta Runtime - layer diff and image reconstruction.
//!
//! This crate computes which layers changed between two exported versions of
//! a container image, packages only those into a diff archive, and rebuilds
//! the complete image on a target that already holds the older version.

#![allow(clippy::result_large_err)]

pub mod archive;
pub mod delta;
pub mod engine;
pub mod lock;
pub mod oci;
pub mod pipeline;

// Re-export common types
pub use archive::{OverwritePolicy, ScratchDir, SealOutcome, SealedArchive};
pub use delta::{diff_archive_name, sanitize_image_name};
pub use delta::{Baseline, BuiltDiff, DiffArchiveBuilder, Reconstruction, Reconstructor};
pub use engine::{ContainerEngine, DockerCli};
pub use lock::{OutputGuard, OutputLocks};
pub use oci::{diff, DiffRecord, ImageTree, LayerId, LayerSet, Manifest};
pub use pipeline::{DeltaPipeline, EntryOutcome, EntryReport, Mode, RunSummary};

/// A3S Delta Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

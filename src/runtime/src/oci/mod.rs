//! Exported image trees and layer-set algebra.
//!
//! An image export (`docker save`) unpacks to:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Image Export Tree                         │
//! │                                                              │
//! │  <root>/                                                     │
//! │  ├── manifest.json        (Config + Layers references)      │
//! │  ├── repositories         (repo -> tag -> id, optional)     │
//! │  ├── index.json           (OCI index, optional)             │
//! │  ├── oci-layout           (OCI layout marker, optional)     │
//! │  └── blobs/                                                  │
//! │      └── sha256/                                             │
//! │          ├── <config>     (image configuration)             │
//! │          └── <layers>     (filesystem layers)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The manifest is authoritative: the layer set of a tree is the set of
//! blobs its manifest references, not whatever happens to be on disk. Only
//! `manifest.json` and `repositories` travel with the layers.

pub mod diff;
pub mod layers;
pub mod tree;

pub use diff::{diff, diff_record_name, DiffRecord};
pub use layers::{LayerId, LayerSet, BLOB_DIR};
pub use tree::{
    ImageTree, Manifest, ManifestEntry, CARRIED_FILES, MANIFEST_FILE, REPOSITORIES_FILE,
};

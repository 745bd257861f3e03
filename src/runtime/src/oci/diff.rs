//! Layer set difference between two image versions.

use std::path::Path;

use a3s_delta_core::error::{DeltaError, Result};
use serde::{Deserialize, Serialize};

use super::layers::LayerSet;

/// Result of comparing two layer sets.
///
/// `added` is authoritative: it defines which blobs travel in a diff archive.
/// `removed` is informational only; nothing is ever deleted because of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub added: LayerSet,
    pub removed: LayerSet,
}

/// Compute `added = new − old` and `removed = old − new`.
pub fn diff(old: &LayerSet, new: &LayerSet) -> DiffRecord {
    DiffRecord {
        added: new.difference(old),
        removed: old.difference(new),
    }
}

/// File name of the serialized diff record for a target tag.
pub fn diff_record_name(new_tag: &str) -> String {
    format!("diff_{}.json", new_tag)
}

impl DiffRecord {
    /// Whether the two versions share every layer.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Canonical JSON encoding: sorted IDs, pretty-printed, trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Read a diff record written by [`DiffRecord::to_json_bytes`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| DeltaError::ManifestParseError {
            path: path.to_path_buf(),
            message: format!("failed to read diff record: {}", e),
        })?;
        serde_json::from_slice(&content).map_err(|e| DeltaError::ManifestParseError {
            path: path.to_path_buf(),
            message: format!("invalid diff record: {}", e),
        })
    }
}

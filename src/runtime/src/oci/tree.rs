//! Exported image tree reader.
//!
//! An exported image tree is the unpacked output of `docker save`:
//!
//! ```text
//! export/
//! ├── manifest.json      (entries with Config, RepoTags, Layers)
//! ├── repositories       (tag → layer mapping, copied verbatim)
//! ├── index.json         (OCI index, optional)
//! ├── oci-layout         (optional)
//! └── blobs/sha256/<hex> (layer and config blobs)
//! ```

use std::path::{Path, PathBuf};

use a3s_delta_core::error::{DeltaError, Result};
use serde::{Deserialize, Serialize};

use super::layers::{LayerId, LayerSet, BLOB_DIR};

/// Manifest file name at the root of an export.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Repository tag record at the root of an export.
pub const REPOSITORIES_FILE: &str = "repositories";

/// Top-level records carried into diff and release archives. `index.json`
/// and `oci-layout` are not among them: the index names a manifest blob that
/// is outside every layer set.
pub const CARRIED_FILES: &[&str] = &[MANIFEST_FILE, REPOSITORIES_FILE];

/// One image entry of `manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "Config", default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    #[serde(rename = "RepoTags", default, skip_serializing_if = "Option::is_none")]
    pub repo_tags: Option<Vec<String>>,

    #[serde(rename = "Layers", default)]
    pub layers: Vec<String>,
}

/// Parsed `manifest.json`.
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    layers: Vec<LayerId>,
    config: Vec<LayerId>,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| DeltaError::ManifestParseError {
            path: path.to_path_buf(),
            message: format!("failed to read: {}", e),
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest bytes. `path` is only used for error reporting.
    pub fn parse(content: &[u8], path: &Path) -> Result<Self> {
        let parse_err = |message: String| DeltaError::ManifestParseError {
            path: path.to_path_buf(),
            message,
        };

        let entries: Vec<ManifestEntry> =
            serde_json::from_slice(content).map_err(|e| parse_err(e.to_string()))?;

        let mut layers = Vec::new();
        let mut config = Vec::new();
        for entry in &entries {
            for reference in &entry.layers {
                let id = LayerId::from_layer_path(reference)
                    .map_err(|e| parse_err(e.to_string()))?;
                if !layers.contains(&id) {
                    layers.push(id);
                }
            }
            if let Some(reference) = &entry.config {
                let id = LayerId::from_layer_path(reference)
                    .map_err(|e| parse_err(e.to_string()))?;
                if !config.contains(&id) {
                    config.push(id);
                }
            }
        }

        if layers.is_empty() {
            return Err(parse_err("manifest references no layers".to_string()));
        }

        Ok(Self {
            entries,
            layers,
            config,
        })
    }

    /// Layer IDs in manifest order, bottom to top, without duplicates.
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    /// Every blob the manifest requires: all layers plus each entry's config.
    pub fn required(&self) -> LayerSet {
        self.layers
            .iter()
            .chain(self.config.iter())
            .cloned()
            .collect()
    }

    /// Repository tags across all entries.
    pub fn repo_tags(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| e.repo_tags.as_ref())
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// Read-only view of an exported image tree.
#[derive(Debug, Clone)]
pub struct ImageTree {
    root: PathBuf,
    manifest: Manifest,
    layers: LayerSet,
}

impl ImageTree {
    /// Open an exported image tree.
    ///
    /// # Errors
    ///
    /// - `NotAnImageTree` if `blobs/sha256` is absent
    /// - `ManifestParseError` if `manifest.json` is missing, malformed, or
    ///   references no layers
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.join(BLOB_DIR).is_dir() {
            return Err(DeltaError::NotAnImageTree {
                path: root,
                expected: BLOB_DIR.to_string(),
            });
        }

        let manifest = Manifest::from_file(&root.join(MANIFEST_FILE))?;
        let layers = manifest.required();

        tracing::debug!(
            root = %root.display(),
            layers = layers.len(),
            "Opened image tree"
        );

        Ok(Self {
            root,
            manifest,
            layers,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Layer set of this version, derived from the manifest.
    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    /// Absolute path where the blob for `id` lives in this tree.
    pub fn blob_path(&self, id: &LayerId) -> PathBuf {
        self.root.join(BLOB_DIR).join(id.as_str())
    }

    /// Whether a regular file exists for `id`.
    pub fn has_blob(&self, id: &LayerId) -> bool {
        self.blob_path(id).is_file()
    }
}

/// Names of the regular files directly under `dir`, sorted.
///
/// Directories are skipped quietly. Symlinks and names that are not UTF-8
/// are skipped with a warning.
pub(crate) fn top_level_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| DeltaError::io_at(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DeltaError::io_at(dir, e))?;
        let file_type = entry.file_type().map_err(|e| DeltaError::io_at(entry.path(), e))?;
        if file_type.is_symlink() {
            tracing::warn!(path = %entry.path().display(), "Skipping symlink");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::warn!(
                dir = %dir.display(),
                name = ?raw,
                "Skipping file with non UTF-8 name"
            ),
        }
    }
    names.sort();
    Ok(names)
}

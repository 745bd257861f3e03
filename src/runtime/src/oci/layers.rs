//! Content-addressed layer identifiers and sets.

use std::collections::HashSet;

use a3s_delta_core::error::{DeltaError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Relative directory holding layer blobs inside an exported image tree.
pub const BLOB_DIR: &str = "blobs/sha256";

/// Content hash identifying one layer blob.
///
/// Stored as the bare hex digest, i.e. the blob's file name under
/// `blobs/sha256/`. Equality is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    /// Create a layer ID from a bare digest.
    ///
    /// Accepts an optional `sha256:` prefix. Rejects anything that is not a
    /// plain alphanumeric token, so an ID can never escape the blob directory.
    pub fn new(digest: &str) -> Result<Self> {
        let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DeltaError::ManifestParseError {
                path: BLOB_DIR.into(),
                message: format!("invalid layer digest '{}'", digest),
            });
        }
        Ok(Self(hex.to_string()))
    }

    /// Parse a manifest layer reference such as `blobs/sha256/<hex>`.
    ///
    /// `./` prefixes and redundant separators are normalized away.
    pub fn from_layer_path(reference: &str) -> Result<Self> {
        let parts: Vec<&str> = reference
            .split(['/', '\\'])
            .filter(|p| !p.is_empty() && *p != ".")
            .collect();

        match parts.as_slice() {
            ["blobs", "sha256", digest] => Self::new(digest),
            _ => Err(DeltaError::ManifestParseError {
                path: reference.into(),
                message: format!("layer reference '{}' is not under {}", reference, BLOB_DIR),
            }),
        }
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this layer's blob relative to the tree root.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", BLOB_DIR, self.0)
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let digest = String::deserialize(deserializer)?;
        LayerId::new(&digest).map_err(serde::de::Error::custom)
    }
}

/// A set of layer IDs.
///
/// Membership is hash-based; serialization always emits the canonical
/// ascending order so output is byte-reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerSet {
    ids: HashSet<LayerId>,
}

impl LayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an ID; returns false if it was already present.
    pub fn insert(&mut self, id: LayerId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &LayerId> {
        self.ids.iter()
    }

    /// IDs in canonical (ascending) order.
    pub fn sorted(&self) -> Vec<&LayerId> {
        let mut ids: Vec<&LayerId> = self.ids.iter().collect();
        ids.sort();
        ids
    }

    /// Elements of `self` not in `other`.
    pub fn difference(&self, other: &LayerSet) -> LayerSet {
        self.ids
            .iter()
            .filter(|id| !other.contains(id))
            .cloned()
            .collect()
    }

    pub fn is_disjoint(&self, other: &LayerSet) -> bool {
        self.ids.is_disjoint(&other.ids)
    }

    pub fn is_subset(&self, other: &LayerSet) -> bool {
        self.ids.is_subset(&other.ids)
    }
}

impl FromIterator<LayerId> for LayerSet {
    fn from_iter<I: IntoIterator<Item = LayerId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Serialize for LayerSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.sorted())
    }
}

impl<'de> Deserialize<'de> for LayerSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let ids = Vec::<LayerId>::deserialize(deserializer)?;
        Ok(ids.into_iter().collect())
    }
}

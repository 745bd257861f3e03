use std::path::PathBuf;

use thiserror::Error;

/// A3S Delta error types
#[derive(Error, Debug)]
pub enum DeltaError {
    /// Malformed worklist entry (missing image or tag)
    #[error("Invalid entry: {0}")]
    InputError(String),

    /// Exported image tree has no layer storage directory
    #[error("Not an image tree: {path} (missing {expected})")]
    NotAnImageTree { path: PathBuf, expected: String },

    /// Manifest or diff record could not be parsed
    #[error("Manifest parse error: {path}: {message}")]
    ManifestParseError { path: PathBuf, message: String },

    /// A layer listed as added has no blob in the export tree
    #[error("Layer {layer} is listed as added but has no blob at {path}")]
    LayerIdInconsistency { layer: String, path: PathBuf },

    /// A manifest-required layer is absent from both the diff archive and the baseline
    #[error("Layer {layer} is required by the target manifest but absent from both the diff archive and the baseline")]
    IrreconcilableLayer { layer: String },

    /// Output archive exists with different content and overwrite is disabled
    #[error("Archive {0} already exists with different content (enable overwrite to replace it)")]
    ArchiveExists(PathBuf),

    /// Another writer currently owns the output path
    #[error("Output path {0} is already being written")]
    OutputBusy(PathBuf),

    /// The entry was cancelled before completion
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Container engine invocation failed
    #[error("Engine error: {command} - {message}")]
    Engine { command: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeltaError {
    /// Attach a path to an I/O failure, keeping its error kind.
    pub fn io_at(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        DeltaError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}

impl From<serde_json::Error> for DeltaError {
    fn from(err: serde_json::Error) -> Self {
        DeltaError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DeltaError {
    fn from(err: serde_yaml::Error) -> Self {
        DeltaError::Serialization(err.to_string())
    }
}

/// Result type alias for A3S Delta operations
pub type Result<T> = std::result::Result<T, DeltaError>;

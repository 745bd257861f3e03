use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{DeltaError, Result};

/// Default directory for generated diff archives
pub const DEFAULT_OUTPUT_DIR: &str = "output-diff-images";

/// Default directory for reconstructed release archives
pub const DEFAULT_RELEASE_DIR: &str = "new-releases";

/// Delta configuration
///
/// Passed explicitly to every component; nothing reads it from process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Directory where `generate` writes diff archives and `apply` reads them
    pub output_dir: PathBuf,

    /// Directory where `apply` writes reconstructed archives
    pub release_dir: PathBuf,

    /// Maximum number of entries processed concurrently
    pub workers: usize,

    /// Replace an existing archive whose content differs
    pub overwrite: bool,

    /// Load the reconstructed archive into the container engine after `apply`
    pub load_after_apply: bool,

    /// Container engine binary
    pub engine_binary: String,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            release_dir: PathBuf::from(DEFAULT_RELEASE_DIR),
            workers: 1,
            overwrite: false,
            load_after_apply: false,
            engine_binary: "docker".to_string(),
            log_level: LogLevel::Info,
        }
    }
}

impl DeltaConfig {
    /// Load configuration from a YAML or JSON file.
    ///
    /// The format is chosen by extension; anything other than `.json` is
    /// parsed as YAML (which also accepts plain JSON).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeltaError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: DeltaConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and that the two output directories are distinct.
    pub fn validate(&self) -> Result<()> {
        fn normalized(path: &Path) -> Vec<Component<'_>> {
            path.components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect()
        }

        if normalized(&self.output_dir) == normalized(&self.release_dir) {
            return Err(DeltaError::Config(format!(
                "output_dir and release_dir must differ (both are {})",
                self.output_dir.display()
            )));
        }
        if self.workers == 0 {
            return Err(DeltaError::Config("workers must be at least 1".to_string()));
        }
        if self.engine_binary.trim().is_empty() {
            return Err(DeltaError::Config(
                "engine_binary must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!(
                "unknown log level: '{}' (supported: debug, info, warn, error)",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DeltaConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("output-diff-images"));
        assert_eq!(config.release_dir, PathBuf::from("new-releases"));
        assert_eq!(config.workers, 1);
        assert!(!config.overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_same_output_and_release_dir_rejected() {
        let config = DeltaConfig {
            output_dir: PathBuf::from("/data/images"),
            release_dir: PathBuf::from("/data/images/"),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DeltaError::Config(_)));
        assert!(err.to_string().contains("must differ"));

        let config = DeltaConfig {
            output_dir: PathBuf::from("./shared"),
            release_dir: PathBuf::from("shared"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file_with_partial_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("delta.yaml");
        std::fs::write(&path, "output_dir: /srv/diffs\nworkers: 4\nlog_level: debug\n").unwrap();

        let config = DeltaConfig::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/diffs"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.log_level, LogLevel::Debug);
        // Unspecified fields keep their defaults
        assert_eq!(config.release_dir, PathBuf::from("new-releases"));
    }

    #[test]
    fn test_from_json_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("delta.json");
        std::fs::write(&path, r#"{"overwrite": true, "release_dir": "rel"}"#).unwrap();

        let config = DeltaConfig::from_file(&path).unwrap();
        assert!(config.overwrite);
        assert_eq!(config.release_dir, PathBuf::from("rel"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("delta.yaml");
        std::fs::write(&path, "workers: 0\n").unwrap();

        let err = DeltaConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, DeltaError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = DeltaConfig::from_file(Path::new("/nonexistent/delta.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}

//! Container engine seam.
//!
//! The diff and reconstruction code only ever sees exported trees. Getting
//! an image into or out of a local engine goes through [`ContainerEngine`].

use std::path::{Path, PathBuf};
use std::process::Command;

use a3s_delta_core::error::{DeltaError, Result};

/// Local container engine able to pull, export and load images.
pub trait ContainerEngine: Send + Sync {
    /// Make `image:tag` available locally. No-op if it already is.
    fn pull(&self, image: &str, tag: &str) -> Result<()>;

    /// Write the exported archive of `image:tag` to `dest`.
    fn export(&self, image: &str, tag: &str, dest: &Path) -> Result<()>;

    /// Load an image archive into the engine.
    fn load(&self, archive: &Path) -> Result<()>;
}

/// `ContainerEngine` backed by the docker command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        tracing::debug!(command = %command, "Running engine command");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| DeltaError::Engine {
                command: command.clone(),
                message: format!("failed to spawn: {}", e),
            })?;
        Ok(output)
    }

    fn run_checked(&self, args: &[&str]) -> Result<()> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeltaError::Engine {
                command: format!("{} {}", self.binary.display(), args.join(" ")),
                message: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerEngine for DockerCli {
    fn pull(&self, image: &str, tag: &str) -> Result<()> {
        let reference = image_ref(image, tag);
        let inspect = self.run(&["image", "inspect", "--format", "{{.Id}}", &reference])?;
        if inspect.status.success() {
            tracing::debug!(image = %reference, "Image available locally");
            return Ok(());
        }

        tracing::info!(image = %reference, "Image not found locally, pulling");
        self.run_checked(&["pull", &reference])
    }

    fn export(&self, image: &str, tag: &str, dest: &Path) -> Result<()> {
        let reference = image_ref(image, tag);
        let dest = dest.to_string_lossy();
        tracing::info!(image = %reference, path = %dest, "Saving image");
        self.run_checked(&["save", "-o", &dest, &reference])
    }

    fn load(&self, archive: &Path) -> Result<()> {
        let archive = archive.to_string_lossy();
        tracing::info!(path = %archive, "Loading image archive");
        self.run_checked(&["load", "--input", &archive])
    }
}

/// `image:tag` reference string.
pub fn image_ref(image: &str, tag: &str) -> String {
    format!("{}:{}", image, tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref() {
        assert_eq!(image_ref("registry/app", "1.2.3"), "registry/app:1.2.3");
    }

    #[test]
    fn test_missing_binary_is_engine_error() {
        let engine = DockerCli::new("/nonexistent/a3s-delta-docker");
        let err = engine.load(Path::new("/tmp/x.tar")).unwrap_err();
        match err {
            DeltaError::Engine { command, .. } => {
                assert!(command.contains("load --input /tmp/x.tar"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_command_carries_stderr() {
        // `false` exits non-zero with no output regardless of arguments
        let engine = DockerCli::new("false");
        let err = engine.export("app", "r1", Path::new("/tmp/out.tar")).unwrap_err();
        assert!(matches!(err, DeltaError::Engine { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_pull_skips_when_inspect_succeeds() {
        // `true` succeeds for `image inspect`, so no pull is attempted
        let engine = DockerCli::new("true");
        assert!(engine.pull("app", "r1").is_ok());
    }

    #[test]
    fn test_default_binary() {
        assert_eq!(DockerCli::default().binary(), Path::new("docker"));
    }
}

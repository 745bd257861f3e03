//! Diff archive construction and image reconstruction.
//!
//! # Archive layout
//!
//! ```text
//! <image>_diff_<new-tag>.tar
//! ├── blobs/sha256/<hex>     (only layers added in the new version)
//! ├── manifest.json          (new version, verbatim)
//! ├── repositories           (new version, verbatim)
//! └── diff_<new-tag>.json    ({"added": [...], "removed": [...]}, sorted)
//! ```

mod builder;
mod reconstruct;

pub use builder::{BuiltDiff, DiffArchiveBuilder};
pub use reconstruct::{Baseline, Reconstruction, Reconstructor};

use a3s_delta_core::error::{DeltaError, Result};
use tokio_util::sync::CancellationToken;

/// Replace path separators in an image name so it can be used as a file name.
pub fn sanitize_image_name(image: &str) -> String {
    image.replace(['/', '\\'], "_")
}

/// Deterministic archive file name for an image and target tag.
pub fn diff_archive_name(image: &str, new_tag: &str) -> String {
    format!("{}_diff_{}.tar", sanitize_image_name(image), new_tag)
}

pub(crate) fn check_cancelled(cancel: &CancellationToken, what: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(DeltaError::Cancelled(what.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_image_name() {
        assert_eq!(sanitize_image_name("nginx"), "nginx");
        assert_eq!(sanitize_image_name("registry/team/app"), "registry_team_app");
        assert_eq!(sanitize_image_name("registry\\app"), "registry_app");
    }

    #[test]
    fn test_diff_archive_name() {
        assert_eq!(
            diff_archive_name("registry/image", "0.63.0"),
            "registry_image_diff_0.63.0.tar"
        );
    }

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();
        assert!(check_cancelled(&token, "x").is_ok());
        token.cancel();
        assert!(matches!(
            check_cancelled(&token, "x"),
            Err(DeltaError::Cancelled(_))
        ));
    }
}

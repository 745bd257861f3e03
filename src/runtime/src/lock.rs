//! Path-keyed writer locks for output archives.
//!
//! One archive build owns one output path. A second writer for a path that
//! is already held is rejected outright with `OutputBusy`; it does not wait.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use a3s_delta_core::error::{DeltaError, Result};
use dashmap::DashMap;

/// Registry of output paths currently being written.
#[derive(Debug, Clone, Default)]
pub struct OutputLocks {
    held: Arc<DashMap<PathBuf, ()>>,
}

impl OutputLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim exclusive write ownership of `path`.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn acquire(&self, path: &Path) -> Result<OutputGuard> {
        let key = normalize(path);
        match self.held.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::warn!(path = %path.display(), "Output path already has a writer");
                Err(DeltaError::OutputBusy(path.to_path_buf()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(OutputGuard {
                    held: Arc::clone(&self.held),
                    key,
                })
            }
        }
    }

    /// Whether `path` currently has a writer.
    pub fn is_held(&self, path: &Path) -> bool {
        self.held.contains_key(&normalize(path))
    }
}

/// Exclusive claim on an output path.
#[derive(Debug)]
pub struct OutputGuard {
    held: Arc<DashMap<PathBuf, ()>>,
    key: PathBuf,
}

impl OutputGuard {
    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

/// Absolute, lexically normalized form of `path`, so `out/a.tar` and
/// `./out/a.tar` map to the same key.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn test_second_writer_rejected() {
        let locks = OutputLocks::new();
        let _guard = locks.acquire(Path::new("/out/app_diff_r2.tar")).unwrap();

        let err = locks.acquire(Path::new("/out/app_diff_r2.tar")).unwrap_err();
        assert!(matches!(err, DeltaError::OutputBusy(_)));
    }

    #[test]
    fn test_release_on_drop() {
        let locks = OutputLocks::new();
        {
            let _guard = locks.acquire(Path::new("/out/a.tar")).unwrap();
            assert!(locks.is_held(Path::new("/out/a.tar")));
        }
        assert!(!locks.is_held(Path::new("/out/a.tar")));
        assert!(locks.acquire(Path::new("/out/a.tar")).is_ok());
    }

    #[test]
    fn test_distinct_paths_independent() {
        let locks = OutputLocks::new();
        let _a = locks.acquire(Path::new("/out/a.tar")).unwrap();
        let _b = locks.acquire(Path::new("/out/b.tar")).unwrap();
    }

    #[test]
    fn test_equivalent_paths_share_a_key() {
        let locks = OutputLocks::new();
        let _guard = locks.acquire(Path::new("out/a.tar")).unwrap();
        assert!(locks.acquire(Path::new("./out/a.tar")).is_err());
        assert!(locks.acquire(Path::new("out/x/../a.tar")).is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let locks = OutputLocks::new();
        let other = locks.clone();
        let _guard = locks.acquire(Path::new("/out/a.tar")).unwrap();
        assert!(other.is_held(Path::new("/out/a.tar")));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        const CLAIMANTS: usize = 8;
        let locks = OutputLocks::new();
        // Every claim is made before any guard is released.
        let all_tried = Arc::new(Barrier::new(CLAIMANTS));
        let handles: Vec<_> = (0..CLAIMANTS)
            .map(|_| {
                let locks = locks.clone();
                let all_tried = all_tried.clone();
                std::thread::spawn(move || {
                    let claim = locks.acquire(Path::new("/out/contended.tar"));
                    all_tried.wait();
                    claim.is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert!(!locks.is_held(Path::new("/out/contended.tar")));
    }
}

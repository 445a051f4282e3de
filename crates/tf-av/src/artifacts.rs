//! Temporary artifact allocation and cleanup.
//!
//! Every uploaded input and every transform output is a [`ArtifactStore`]
//! allocation: a path under the store's root whose filename embeds a random
//! 128-bit component, so concurrent requests can never collide and no
//! locking is needed. Release is best-effort per path — a failure to delete
//! one artifact is logged and never blocks cleanup of its siblings.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Allocates collision-free temp paths and deletes them on release.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> tf_core::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory artifacts are allocated under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Produce a fresh path `<root>/<prefix>_<random>.<extension>`.
    ///
    /// The path is not created on disk; the caller owns it from here on and
    /// must hand it back to [`ArtifactStore::release`] on every exit path.
    pub fn allocate(&self, prefix: &str, extension: &str) -> PathBuf {
        let token = Uuid::new_v4().simple();
        let name = if extension.is_empty() {
            format!("{prefix}_{token}")
        } else {
            format!("{prefix}_{token}.{extension}")
        };
        self.root.join(name)
    }

    /// Delete the given paths, swallowing and logging per-path errors.
    ///
    /// Releasing a path that was never written (or already released) is a
    /// no-op, so cleanup code can be unconditional.
    pub fn release<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) {
        for path in paths {
            let path = path.as_ref();
            match std::fs::remove_file(path) {
                Ok(()) => {
                    tracing::debug!(artifact = %path.display(), "Released artifact");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        artifact = %path.display(),
                        error = %e,
                        "Failed to release artifact"
                    );
                }
            }
        }
    }
}

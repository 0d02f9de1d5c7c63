use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::TempDir;

/// Process-scoped scratch area for extracted archive entries.
///
/// The base directory is created eagerly; per-archive subdirectories are created on first use.
/// The directory is deleted by [`TemporaryDirectory::close`] or, failing that, on drop.
#[derive(Debug)]
pub struct TemporaryDirectory {
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl TemporaryDirectory {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("kite-").tempdir()?;
        let path = dir.path().to_path_buf();
        tracing::debug!(target: "kite.vfs", path = %path.display(), "created extraction directory");
        Ok(Self {
            path,
            dir: Mutex::new(Some(dir)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.dir.lock().is_none()
    }

    /// Directory holding entries extracted from `archive`. Two archives with the same file name
    /// never share a directory.
    pub fn archive_dir(&self, archive: &Path) -> io::Result<PathBuf> {
        let guard = self.dir.lock();
        if guard.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "extraction directory already closed",
            ));
        }

        let mut hasher = DefaultHasher::new();
        archive.hash(&mut hasher);
        let stem = archive
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let dir = self.path.join(format!("{stem}-{:016x}", hasher.finish()));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Deletes the directory. Idempotent.
    pub fn close(&self) -> io::Result<()> {
        match self.dir.lock().take() {
            Some(dir) => {
                tracing::debug!(
                    target: "kite.vfs",
                    path = %self.path.display(),
                    "removing extraction directory"
                );
                dir.close()
            }
            None => Ok(()),
        }
    }
}

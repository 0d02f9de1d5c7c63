//! Access to dependency archives (JARs/zips) and exploded archive directories.
//!
//! Entry names always use `/` separators, mirroring the zip format, regardless of platform.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use zip::ZipArchive;

#[derive(Clone, Debug)]
pub struct Archive {
    path: PathBuf,
}

impl Archive {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Normalizes a user supplied entry name (`\` separators, leading slashes).
    #[must_use]
    pub fn normalize_entry(name: &str) -> String {
        name.trim_start_matches(['/', '\\']).replace('\\', "/")
    }

    /// Read a file from the archive.
    ///
    /// Returns `Ok(None)` when the file isn't present.
    pub fn read(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let name = Self::normalize_entry(name);
        if self.path.is_dir() {
            let candidate = self.path.join(&name);
            if !candidate.is_file() {
                return Ok(None);
            }
            let mut buf = Vec::new();
            File::open(&candidate)
                .with_context(|| format!("failed to open {}", candidate.display()))?
                .read_to_end(&mut buf)
                .with_context(|| format!("failed to read {}", candidate.display()))?;
            return Ok(Some(buf));
        }

        let mut zip = self.open_zip()?;
        let result = match zip.by_name(&name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).with_context(|| {
                    format!("failed to read {} from {}", name, self.path.display())
                })?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read {} from zip {}", name, self.path.display())
            }),
        };
        result
    }

    /// Lists every file entry in the archive (directories are skipped), sorted.
    pub fn entry_names(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        if self.path.is_dir() {
            let mut pending = vec![self.path.clone()];
            while let Some(dir) = pending.pop() {
                for entry in fs::read_dir(&dir)
                    .with_context(|| format!("failed to list {}", dir.display()))?
                {
                    let entry = entry?;
                    let path = entry.path();
                    if entry.file_type()?.is_dir() {
                        pending.push(path);
                    } else if let Ok(rel) = path.strip_prefix(&self.path) {
                        names.push(Self::normalize_entry(&rel.to_string_lossy()));
                    }
                }
            }
        } else {
            let zip = self.open_zip()?;
            names.extend(
                zip.file_names()
                    .filter(|name| !name.ends_with('/'))
                    .map(str::to_owned),
            );
        }
        names.sort();
        Ok(names)
    }

    /// Copies a single entry to `dest`, creating parent directories as needed.
    ///
    /// Returns `Ok(false)` when the entry isn't present; `dest` is left untouched in that case.
    pub fn extract_entry(&self, name: &str, dest: &Path) -> anyhow::Result<bool> {
        let Some(bytes) = self.read(name)? else {
            return Ok(false);
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(dest, bytes).with_context(|| format!("failed to write {}", dest.display()))?;
        Ok(true)
    }

    fn open_zip(&self) -> anyhow::Result<ZipArchive<File>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open archive {}", self.path.display()))?;
        ZipArchive::new(file).with_context(|| format!("failed to read zip {}", self.path.display()))
    }
}

/// Returns whether `path` looks like a packaged archive by extension.
pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jar" | "zip" | "klib"))
}

/// Returns whether an IO error chain bottoms out in `NotFound`.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::NotFound)
    })
}

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use kite_archive::{is_not_found, Archive};
use parking_lot::Mutex;

use crate::{ArchivePath, DocumentUri, TemporaryDirectory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    /// Document text; non UTF-8 content is decoded lossily.
    pub text: String,
    /// A plain filesystem path carrying the exact bytes (the extracted copy for archive entries).
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("unreadable archive {}: {message}", path.display())]
    UnreadableArchive { path: PathBuf, message: String },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolves document URIs to text.
///
/// Archive entries are extracted one at a time into the scratch directory; extraction is
/// idempotent for the lifetime of the resolver and source archives are never modified.
#[derive(Debug)]
pub struct ContentResolver {
    temp: TemporaryDirectory,
    extracted: Mutex<HashMap<ArchivePath, PathBuf>>,
    extractions: AtomicUsize,
}

impl ContentResolver {
    /// Fails only when the scratch directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_temp_dir(TemporaryDirectory::new()?))
    }

    pub fn with_temp_dir(temp: TemporaryDirectory) -> Self {
        Self {
            temp,
            extracted: Mutex::new(HashMap::new()),
            extractions: AtomicUsize::new(0),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp.path()
    }

    pub fn resolve(&self, uri: &DocumentUri) -> Result<ResolvedContent, ResolveError> {
        match uri {
            DocumentUri::File(path) => Ok(ResolvedContent {
                text: read_text(path)?,
                path: path.clone(),
            }),
            DocumentUri::Archive(entry) => {
                let path = self.extract(entry)?;
                Ok(ResolvedContent {
                    text: read_text(&path)?,
                    path,
                })
            }
        }
    }

    /// Lists the file entries of an archive (jar/zip or exploded directory).
    pub fn archive_entries(&self, archive: &Path) -> Result<Vec<String>, ResolveError> {
        if !archive.exists() {
            return Err(ResolveError::NotFound(archive.display().to_string()));
        }
        Archive::new(archive)
            .entry_names()
            .map_err(|err| unreadable(archive, &err))
    }

    /// Number of entries physically extracted so far.
    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Releases cached extraction paths and deletes the scratch directory.
    pub fn close(&self) -> io::Result<()> {
        self.extracted.lock().clear();
        self.temp.close()
    }

    fn extract(&self, entry: &ArchivePath) -> Result<PathBuf, ResolveError> {
        // The lock is held across extraction so concurrent resolutions of one entry extract once.
        let mut extracted = self.extracted.lock();
        if let Some(path) = extracted.get(entry) {
            if path.is_file() {
                return Ok(path.clone());
            }
        }

        let display = || DocumentUri::Archive(entry.clone()).to_string();
        let relative =
            safe_relative_path(&entry.entry).ok_or_else(|| ResolveError::NotFound(display()))?;
        if !entry.archive.exists() {
            return Err(ResolveError::NotFound(display()));
        }

        let dest = self
            .temp
            .archive_dir(&entry.archive)
            .map_err(|err| ResolveError::UnreadableArchive {
                path: entry.archive.clone(),
                message: format!("cannot prepare extraction directory: {err}"),
            })?
            .join(relative);

        match Archive::new(&entry.archive).extract_entry(&entry.entry, &dest) {
            Ok(true) => {
                self.extractions.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    target: "kite.vfs",
                    archive = %entry.archive.display(),
                    entry = %entry.entry,
                    dest = %dest.display(),
                    "extracted archive entry"
                );
                extracted.insert(entry.clone(), dest.clone());
                Ok(dest)
            }
            Ok(false) => Err(ResolveError::NotFound(display())),
            Err(err) if is_not_found(&err) => Err(ResolveError::NotFound(display())),
            Err(err) => Err(unreadable(&entry.archive, &err)),
        }
    }
}

fn unreadable(archive: &Path, err: &anyhow::Error) -> ResolveError {
    ResolveError::UnreadableArchive {
        path: archive.to_path_buf(),
        message: format!("{err:#}"),
    }
}

fn read_text(path: &Path) -> Result<String, ResolveError> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(ResolveError::NotFound(path.display().to_string()))
        }
        Err(source) => Err(ResolveError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Entry names must stay inside the extraction directory.
fn safe_relative_path(entry: &str) -> Option<PathBuf> {
    let path = Path::new(entry);
    let safe = path
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    (safe && !entry.is_empty()).then(|| path.to_path_buf())
}

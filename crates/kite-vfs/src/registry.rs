use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kite_core::{collect_files_with_extensions, is_excluded_dir, SourceVersion};

use crate::{
    apply_content_changes, ContentChange, ContentResolver, DocumentError, DocumentUri,
    ResolveError,
};

/// Where the current content of a record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Disk,
    /// An editor buffer; wins over disk until the document is closed.
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileRecord {
    pub uri: DocumentUri,
    pub text: Arc<str>,
    pub version: SourceVersion,
    pub origin: Origin,
    /// Deepest workspace root containing the file; `None` for loose documents.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The URI was not open.
    Ignored,
    /// The record reverted to its disk content at the given version.
    Reverted(SourceVersion),
    /// The file is gone from disk (or was an archive entry) and the record was dropped.
    Removed,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("document not found: {0}")]
    NotFound(DocumentUri),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which files count as sources during root scans and watched-file events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDiscovery {
    pub extensions: Vec<String>,
    pub exclude_dirs: Vec<String>,
}

impl Default for SourceDiscovery {
    fn default() -> Self {
        Self {
            extensions: vec!["kt".to_string(), "kts".to_string()],
            exclude_dirs: ["build", ".git", ".gradle", "out", "node_modules"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl SourceDiscovery {
    /// Whether `path` is a source file that a scan of `root` would have discovered.
    pub fn matches(&self, root: &Path, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext));
        let mut dirs = relative.components().rev().skip(1);
        has_extension
            && !dirs.any(|dir| {
                dir.as_os_str()
                    .to_str()
                    .is_some_and(|name| is_excluded_dir(name, &self.exclude_dirs))
            })
    }
}

/// Authoritative set of known source files.
///
/// Versions strictly increase per URI for the lifetime of the registry, including across
/// removal and re-creation of a file.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    records: HashMap<DocumentUri, SourceFileRecord>,
    /// Last version handed out for URIs whose record was dropped.
    retired: HashMap<DocumentUri, SourceVersion>,
    /// Sorted; nested roots are allowed.
    roots: Vec<PathBuf>,
    discovery: SourceDiscovery,
}

impl SourceRegistry {
    pub fn new(discovery: SourceDiscovery) -> Self {
        Self {
            discovery,
            ..Self::default()
        }
    }

    pub fn discovery(&self) -> &SourceDiscovery {
        &self.discovery
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn get(&self, uri: &DocumentUri) -> Option<&SourceFileRecord> {
        self.records.get(uri)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every known record, sorted by URI.
    pub fn all(&self) -> Vec<SourceFileRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.uri.cmp(&b.uri));
        records
    }

    /// Records currently owned by `root`.
    pub fn records_under(&self, root: &Path) -> Vec<SourceFileRecord> {
        let mut records: Vec<_> = self
            .records
            .values()
            .filter(|record| record.root.as_deref() == Some(root))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.uri.cmp(&b.uri));
        records
    }

    /// Deepest registered root containing `path`.
    pub fn root_for(&self, path: &Path) -> Option<&Path> {
        self.roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    /// Registers `root` and every source file beneath it as disk-backed.
    ///
    /// Files already known keep their content and version; only their owning root may change
    /// when `root` is nested inside an existing one. Returns the newly registered URIs.
    pub fn add_root(&mut self, root: &Path) -> Result<Vec<DocumentUri>, RegistryError> {
        if !self.roots.iter().any(|known| known == root) {
            self.roots.push(root.to_path_buf());
            self.roots.sort();
        }

        let files = collect_files_with_extensions(
            root,
            &self.discovery.extensions,
            &self.discovery.exclude_dirs,
        )
        .map_err(|source| RegistryError::Scan {
            path: root.to_path_buf(),
            source,
        })?;

        self.reparent();

        let mut added = Vec::new();
        for path in files {
            let uri = DocumentUri::File(path.clone());
            if self.records.contains_key(&uri) {
                continue;
            }
            match read_disk(&path) {
                Ok(text) => {
                    self.insert_new(uri.clone(), text, Origin::Disk);
                    added.push(uri);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "kite.vfs",
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable source file"
                    );
                }
            }
        }

        tracing::debug!(
            target: "kite.vfs",
            root = %root.display(),
            added = added.len(),
            "registered sources for root"
        );
        Ok(added)
    }

    /// Opens a document for editing, creating the record if needed.
    pub fn open(&mut self, uri: DocumentUri, text: impl Into<Arc<str>>) -> SourceVersion {
        let text = text.into();
        match self.records.get_mut(&uri) {
            Some(record) => {
                record.text = text;
                record.origin = Origin::Open;
                record.version += 1;
                record.version
            }
            None => self.insert_new(uri, text, Origin::Open),
        }
    }

    /// Replaces the whole buffer of a known document.
    pub fn edit(
        &mut self,
        uri: &DocumentUri,
        text: impl Into<Arc<str>>,
    ) -> Result<SourceVersion, RegistryError> {
        let record = self
            .records
            .get_mut(uri)
            .ok_or_else(|| RegistryError::NotFound(uri.clone()))?;
        record.text = text.into();
        record.origin = Origin::Open;
        record.version += 1;
        Ok(record.version)
    }

    /// Applies incremental changes to a known document; the version is bumped once.
    pub fn apply_changes(
        &mut self,
        uri: &DocumentUri,
        changes: &[ContentChange],
    ) -> Result<SourceVersion, RegistryError> {
        let record = self
            .records
            .get(uri)
            .ok_or_else(|| RegistryError::NotFound(uri.clone()))?;
        let text = apply_content_changes(&record.text, changes)?;
        self.edit(uri, text)
    }

    /// Drops the editor buffer and reverts to disk content read through `resolver`.
    pub fn close(
        &mut self,
        uri: &DocumentUri,
        resolver: &ContentResolver,
    ) -> Result<CloseOutcome, RegistryError> {
        match self.records.get(uri) {
            Some(record) if record.origin == Origin::Open => {}
            _ => return Ok(CloseOutcome::Ignored),
        }

        if uri.is_archive() {
            self.retire(uri);
            return Ok(CloseOutcome::Removed);
        }

        match resolver.resolve(uri) {
            Ok(content) => {
                let version = self.replace_disk_content(uri, content.text.into());
                Ok(CloseOutcome::Reverted(version))
            }
            Err(ResolveError::NotFound(_)) => {
                self.retire(uri);
                Ok(CloseOutcome::Removed)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Re-reads a disk-backed file after a watched-file change.
    ///
    /// Open buffers win over disk and are left alone. A file that disappeared is removed; a new
    /// source file under a known root is registered. Returns the new version when the content
    /// changed.
    pub fn reload_from_disk(&mut self, path: &Path) -> Result<Option<SourceVersion>, RegistryError> {
        let uri = DocumentUri::File(path.to_path_buf());
        if self
            .records
            .get(&uri)
            .is_some_and(|record| record.origin == Origin::Open)
        {
            return Ok(None);
        }

        let text = match read_disk(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.remove(&uri);
                return Ok(None);
            }
            Err(source) => {
                return Err(RegistryError::Scan {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        match self.records.get(&uri) {
            Some(record) if *record.text == *text => Ok(None),
            Some(_) => Ok(Some(self.replace_disk_content(&uri, text))),
            None => {
                let discovered = self
                    .root_for(path)
                    .is_some_and(|root| self.discovery.matches(root, path));
                if !discovered {
                    return Ok(None);
                }
                Ok(Some(self.insert_new(uri, text, Origin::Disk)))
            }
        }
    }

    /// Forgets a disk-backed file. Open buffers are kept. Returns whether a record was dropped.
    pub fn remove(&mut self, uri: &DocumentUri) -> bool {
        match self.records.get(uri) {
            Some(record) if record.origin == Origin::Disk => {
                self.retire(uri);
                true
            }
            _ => false,
        }
    }

    fn insert_new(&mut self, uri: DocumentUri, text: Arc<str>, origin: Origin) -> SourceVersion {
        let version = self
            .retired
            .remove(&uri)
            .map_or(0, |last| last + 1);
        let root = uri
            .as_file_path()
            .and_then(|path| self.root_for(path))
            .map(Path::to_path_buf);
        self.records.insert(
            uri.clone(),
            SourceFileRecord {
                uri,
                text,
                version,
                origin,
                root,
            },
        );
        version
    }

    fn replace_disk_content(&mut self, uri: &DocumentUri, text: Arc<str>) -> SourceVersion {
        match self.records.get_mut(uri) {
            Some(record) => {
                record.text = text;
                record.origin = Origin::Disk;
                record.version += 1;
                record.version
            }
            None => self.insert_new(uri.clone(), text, Origin::Disk),
        }
    }

    fn retire(&mut self, uri: &DocumentUri) {
        if let Some(record) = self.records.remove(uri) {
            self.retired.insert(record.uri, record.version);
        }
    }

    fn reparent(&mut self) {
        let roots = &self.roots;
        for record in self.records.values_mut() {
            let Some(path) = record.uri.as_file_path() else {
                continue;
            };
            record.root = roots
                .iter()
                .filter(|root| path.starts_with(root))
                .max_by_key(|root| root.components().count())
                .cloned();
        }
    }
}

fn read_disk(path: &Path) -> io::Result<Arc<str>> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into())
}

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kite_classpath::{ClasspathEntry, ClasspathManager, ClasspathSnapshot};
use kite_config::KiteConfig;
use kite_index::{AnalysisEntry, IndexError, WorkspaceIndex};
use kite_scheduler::CancellationToken;
use kite_vfs::{ArchivePath, ContentResolver, DocumentUri, SourceFileRecord, SourceRegistry};
use parking_lot::RwLock;

use crate::WorkspaceError;

/// Everything the serializer tasks operate on.
///
/// Lock order: `registry` before `classpath`. Writers only run inside mutating tasks.
pub(crate) struct Shared {
    pub(crate) config: KiteConfig,
    pub(crate) resolver: ContentResolver,
    pub(crate) registry: RwLock<SourceRegistry>,
    pub(crate) classpath: RwLock<ClasspathManager>,
    pub(crate) index: WorkspaceIndex,
    pub(crate) client_snippets: AtomicBool,
}

impl Shared {
    pub(crate) fn snippets_enabled(&self) -> bool {
        self.config.completion.snippets && self.client_snippets.load(Ordering::Relaxed)
    }

    pub(crate) fn classpath_for(&self, record: &SourceFileRecord) -> ClasspathSnapshot {
        record
            .root
            .as_deref()
            .and_then(|root| self.classpath.read().snapshot(root))
            .unwrap_or_else(ClasspathSnapshot::loose)
    }

    /// Current record of `uri` together with the classpath it is analyzed against.
    pub(crate) fn lookup(
        &self,
        uri: &DocumentUri,
    ) -> Result<(SourceFileRecord, ClasspathSnapshot), WorkspaceError> {
        let record = self
            .registry
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| WorkspaceError::NotFound(uri.to_string()))?;
        let classpath = self.classpath_for(&record);
        Ok((record, classpath))
    }

    /// The cached analysis if it is fresh. Never touches the engine.
    pub(crate) fn peek(&self, uri: &DocumentUri) -> Result<Option<Arc<AnalysisEntry>>, WorkspaceError> {
        let (record, classpath) = self.lookup(uri)?;
        Ok(self.index.peek(&record, &classpath))
    }

    pub(crate) fn analyze(
        &self,
        uri: &DocumentUri,
        token: &CancellationToken,
    ) -> Result<Arc<AnalysisEntry>, WorkspaceError> {
        let (record, classpath) = self.lookup(uri)?;
        Ok(self.index.get(&record, &classpath, token)?)
    }

    /// Analyses of `uris`. Documents that vanished meanwhile or fail with an IO error are
    /// skipped; cancellation aborts the batch.
    pub(crate) fn analyze_all(
        &self,
        uris: &[DocumentUri],
        token: &CancellationToken,
    ) -> Result<Vec<Arc<AnalysisEntry>>, WorkspaceError> {
        let mut entries = Vec::with_capacity(uris.len());
        for uri in uris {
            match self.analyze(uri, token) {
                Ok(entry) => entries.push(entry),
                Err(WorkspaceError::NotFound(_)) => {}
                Err(WorkspaceError::Cancelled) => return Err(WorkspaceError::Cancelled),
                Err(err) => {
                    tracing::warn!(target: "kite.workspace", %uri, error = %err, "skipping document");
                }
            }
        }
        Ok(entries)
    }

    /// Re-reads the classpath of `root`; a change lazily invalidates every analysis under it.
    pub(crate) fn refresh_classpath(&self, root: &Path) -> Result<bool, WorkspaceError> {
        let changed = self.classpath.write().refresh(root)?;
        if changed {
            self.index.invalidate_root(root);
        }
        Ok(changed)
    }

    /// Where the declaration of the fully qualified class `name` lives on `classpath`.
    ///
    /// Archives yield `jar:` URIs, class directories the `.class` file and source directories
    /// the source file. Nested classes fall back to their outermost class.
    pub(crate) fn locate_class(
        &self,
        classpath: &ClasspathSnapshot,
        name: &str,
    ) -> Option<DocumentUri> {
        let mut candidate = Some(name);
        while let Some(class) = candidate {
            let relative = class.replace('.', "/");
            for entry in classpath.entries.iter() {
                if let Some(found) = self.locate_in_entry(entry, &relative) {
                    return Some(found);
                }
            }
            candidate = class.rsplit_once('.').map(|(owner, _)| owner);
        }
        None
    }

    fn locate_in_entry(&self, entry: &ClasspathEntry, relative: &str) -> Option<DocumentUri> {
        match entry {
            ClasspathEntry::Archive(archive) => {
                let wanted = format!("{relative}.class");
                match self.resolver.archive_entries(archive) {
                    Ok(names) => names
                        .iter()
                        .any(|name| *name == wanted)
                        .then(|| DocumentUri::Archive(ArchivePath::new(archive, &wanted))),
                    Err(err) => {
                        tracing::debug!(
                            target: "kite.workspace",
                            archive = %archive.display(),
                            error = %err,
                            "skipping unreadable archive"
                        );
                        None
                    }
                }
            }
            ClasspathEntry::ClassDir(dir) => {
                let path = dir.join(format!("{relative}.class"));
                path.is_file().then(|| DocumentUri::File(path))
            }
            ClasspathEntry::SourceDir(dir) => self
                .config
                .sources
                .extensions
                .iter()
                .map(|ext| dir.join(format!("{relative}.{ext}")))
                .find(|path| path.is_file())
                .map(DocumentUri::File),
        }
    }
}

impl From<IndexError> for WorkspaceError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Io { source, .. } => WorkspaceError::Io(source),
            IndexError::Cancelled => WorkspaceError::Cancelled,
        }
    }
}

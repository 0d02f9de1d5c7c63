use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kite_classpath::ClasspathSnapshot;
use kite_core::{Position, Range};
use kite_scheduler::CancellationToken;
use kite_vfs::{DocumentUri, SourceFileRecord};
use parking_lot::{Mutex, RwLock};

use crate::{
    AnalysisTag, CompilationEngine, CompileInput, Diagnostic, EngineError, Import, Severity,
    Symbol,
};

/// Immutable analysis snapshot of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisEntry {
    pub uri: DocumentUri,
    pub tag: AnalysisTag,
    pub root: Option<PathBuf>,
    pub package: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
    /// Text the analysis was computed from.
    pub text: Arc<str>,
    root_epoch: u64,
}

impl AnalysisEntry {
    /// Fully qualified name of a top-level symbol, or `Container.name` for members.
    pub fn qualified_name(&self, symbol: &Symbol) -> String {
        let local = match &symbol.container {
            Some(container) => format!("{container}.{}", symbol.name),
            None => symbol.name.clone(),
        };
        match &self.package {
            Some(package) => format!("{package}.{local}"),
            None => local,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error while analyzing {uri}: {source}")]
    Io {
        uri: DocumentUri,
        #[source]
        source: std::io::Error,
    },
    #[error("analysis cancelled")]
    Cancelled,
}

/// Cache of per-document analyses in front of the compilation engine.
///
/// Invalidation of a whole root bumps an epoch counter instead of touching entries; staleness is
/// decided when an entry is read.
pub struct WorkspaceIndex {
    engine: Mutex<Box<dyn CompilationEngine>>,
    entries: RwLock<HashMap<DocumentUri, Arc<AnalysisEntry>>>,
    epochs: RwLock<HashMap<PathBuf, u64>>,
    recomputes: AtomicUsize,
}

impl WorkspaceIndex {
    pub fn new(engine: Box<dyn CompilationEngine>) -> Self {
        Self {
            engine: Mutex::new(engine),
            entries: RwLock::new(HashMap::new()),
            epochs: RwLock::new(HashMap::new()),
            recomputes: AtomicUsize::new(0),
        }
    }

    /// Returns the analysis for `record`, recomputing it if the cached entry is stale or absent.
    ///
    /// Compiler failures are recorded as diagnostics on the entry. Only IO failures and
    /// cancellation are errors.
    pub fn get(
        &self,
        record: &SourceFileRecord,
        classpath: &ClasspathSnapshot,
        token: &CancellationToken,
    ) -> Result<Arc<AnalysisEntry>, IndexError> {
        if let Some(entry) = self.peek(record, classpath) {
            return Ok(entry);
        }
        if token.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let mut engine = self.engine.lock();
        // Another caller may have finished the same recompute while we waited for the engine.
        if let Some(entry) = self.peek(record, classpath) {
            return Ok(entry);
        }

        let tag = AnalysisTag::new(record.version, classpath.generation);
        let root_epoch = self.epoch(record.root.as_deref());
        self.recomputes.fetch_add(1, Ordering::SeqCst);
        let input = CompileInput {
            uri: &record.uri,
            text: &record.text,
            classpath,
        };
        let output = match engine.compile(&input, token) {
            Ok(output) => output,
            Err(EngineError::Compilation(message)) => {
                tracing::debug!(
                    target: "kite.index",
                    uri = %record.uri,
                    %message,
                    "compilation failed; recording as diagnostic"
                );
                crate::CompileOutput {
                    diagnostics: vec![Diagnostic {
                        range: Range::point(Position::new(0, 0)),
                        severity: Severity::Error,
                        code: Some("compile".to_string()),
                        message,
                    }],
                    ..Default::default()
                }
            }
            Err(EngineError::Io(source)) => {
                return Err(IndexError::Io {
                    uri: record.uri.clone(),
                    source,
                })
            }
            Err(EngineError::Cancelled) => return Err(IndexError::Cancelled),
        };
        drop(engine);

        let entry = Arc::new(AnalysisEntry {
            uri: record.uri.clone(),
            tag,
            root: record.root.clone(),
            package: output.package,
            diagnostics: output.diagnostics,
            symbols: output.symbols,
            imports: output.imports,
            text: Arc::clone(&record.text),
            root_epoch,
        });
        tracing::trace!(
            target: "kite.index",
            uri = %record.uri,
            version = tag.source_version,
            generation = tag.classpath_generation,
            "analysis recomputed"
        );
        self.entries
            .write()
            .insert(record.uri.clone(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Returns the cached entry only if it is fresh for `record` and `classpath`. Never touches
    /// the engine.
    pub fn peek(
        &self,
        record: &SourceFileRecord,
        classpath: &ClasspathSnapshot,
    ) -> Option<Arc<AnalysisEntry>> {
        let tag = AnalysisTag::new(record.version, classpath.generation);
        let entries = self.entries.read();
        let entry = entries.get(&record.uri)?;
        let fresh = entry.tag == tag
            && entry.root == record.root
            && entry.root_epoch == self.epoch(record.root.as_deref());
        fresh.then(|| Arc::clone(entry))
    }

    /// Marks every entry under `root` stale. O(1); nothing is recomputed until the next `get`.
    pub fn invalidate_root(&self, root: &Path) {
        let mut epochs = self.epochs.write();
        let epoch = epochs.entry(root.to_path_buf()).or_insert(0);
        *epoch += 1;
        tracing::debug!(target: "kite.index", root = %root.display(), epoch = *epoch, "invalidated root");
    }

    pub fn forget(&self, uri: &DocumentUri) {
        self.entries.write().remove(uri);
    }

    /// Number of engine invocations so far.
    pub fn recompute_count(&self) -> usize {
        self.recomputes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn epoch(&self, root: Option<&Path>) -> u64 {
        root.and_then(|root| self.epochs.read().get(root).copied())
            .unwrap_or(0)
    }
}

//! The Kite workspace: the facade an LSP transport talks to.
//!
//! [`Workspace`] wires the content resolver, source registry, classpath manager and workspace
//! index together behind a [`TaskSerializer`]. Every entry point is async; mutating work and
//! compilation run as serialized tasks while fresh analyses are served without queueing.

mod capabilities;
pub mod convert;
mod handlers;
mod init;
mod state;
mod watch;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kite_classpath::{ClasspathError, ClasspathManager};
use kite_index::{HeuristicEngine, WorkspaceIndex};
use kite_scheduler::{Cancelled, SerializerConfig, TaskError, TaskKind, TaskSerializer};
use kite_vfs::{
    ContentResolver, DocumentError, RegistryError, ResolveError, SourceDiscovery, SourceRegistry,
    UriError,
};
use parking_lot::RwLock;
use thiserror::Error;

pub use capabilities::{server_capabilities, COMMANDS};
pub use init::{InitPhase, InitializeReport, RootReport};
pub use kite_config::KiteConfig;
pub use kite_core::{ClasspathGeneration, Position, Range, SourceVersion};
pub use kite_index::query::SymbolMatch;
pub use kite_index::{
    AnalysisEntry, AnalysisTag, CompilationEngine, CompileInput, CompileOutput, Diagnostic,
    EngineError, Severity, Symbol, SymbolKind,
};
pub use kite_project::{BuildConfigReader, DefaultBuildConfigReader};
pub use kite_scheduler::{CancellationToken, ProgressEvent, ProgressReceiver};
pub use kite_vfs::{CloseOutcome, DocumentUri};
pub use watch::{ChangeCategory, FileChange, WatchedFilesReport};

use state::Shared;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("unreadable archive {}: {message}", path.display())]
    UnreadableArchive { path: PathBuf, message: String },
    #[error("server closed")]
    ServerClosed,
    #[error("request cancelled")]
    Cancelled,
    #[error("task panicked")]
    Panicked,
    #[error(transparent)]
    InvalidUri(#[from] UriError),
    #[error(transparent)]
    InvalidEdit(#[from] DocumentError),
    #[error(transparent)]
    Classpath(#[from] ClasspathError),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid command arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to start workspace: {0}")]
    Startup(String),
}

impl From<TaskError> for WorkspaceError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Cancelled => WorkspaceError::Cancelled,
            TaskError::ServerClosed => WorkspaceError::ServerClosed,
            TaskError::Panicked => WorkspaceError::Panicked,
        }
    }
}

impl From<ResolveError> for WorkspaceError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(what) => WorkspaceError::NotFound(what),
            ResolveError::UnreadableArchive { path, message } => {
                WorkspaceError::UnreadableArchive { path, message }
            }
            ResolveError::Io { source, .. } => WorkspaceError::Io(source),
        }
    }
}

impl From<RegistryError> for WorkspaceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(uri) => WorkspaceError::NotFound(uri.to_string()),
            RegistryError::Document(err) => WorkspaceError::InvalidEdit(err),
            RegistryError::Resolve(err) => err.into(),
            RegistryError::Scan { source, .. } => WorkspaceError::Io(source),
        }
    }
}

pub struct Workspace {
    shared: Arc<Shared>,
    serializer: TaskSerializer,
    closed: AtomicBool,
}

impl Workspace {
    /// A workspace with the built-in heuristic engine and the default build-configuration
    /// readers. Fails only when the extraction directory cannot be created.
    pub fn new(config: KiteConfig) -> Result<Self, WorkspaceError> {
        let engine =
            HeuristicEngine::new().map_err(|err| WorkspaceError::Startup(err.to_string()))?;
        Self::with_engine(
            config,
            Box::new(engine),
            Arc::new(DefaultBuildConfigReader::default()),
        )
    }

    pub fn with_engine(
        config: KiteConfig,
        engine: Box<dyn CompilationEngine>,
        reader: Arc<dyn BuildConfigReader>,
    ) -> Result<Self, WorkspaceError> {
        let resolver = ContentResolver::new().map_err(|err| {
            WorkspaceError::Startup(format!("cannot create extraction directory: {err}"))
        })?;

        let mut serializer_config = SerializerConfig::default();
        if let Some(threads) = config.scheduler.read_threads {
            serializer_config.read_threads = threads;
        }
        let discovery = SourceDiscovery {
            extensions: config.sources.extensions.clone(),
            exclude_dirs: config.sources.exclude_dirs.clone(),
        };

        tracing::debug!(
            target: "kite.workspace",
            temp_dir = %resolver.temp_dir().display(),
            read_threads = serializer_config.read_threads,
            "workspace created"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                resolver,
                registry: RwLock::new(SourceRegistry::new(discovery)),
                classpath: RwLock::new(ClasspathManager::new(reader)),
                index: WorkspaceIndex::new(engine),
                client_snippets: AtomicBool::new(false),
            }),
            serializer: TaskSerializer::new(serializer_config),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &KiteConfig {
        &self.shared.config
    }

    pub fn subscribe_progress(&self) -> ProgressReceiver {
        self.serializer.subscribe_progress()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Workspace roots registered so far, sorted.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.shared.registry.read().roots().to_vec()
    }

    /// Every known document, sorted by URI.
    pub fn documents(&self) -> Vec<DocumentUri> {
        self.shared
            .registry
            .read()
            .all()
            .into_iter()
            .map(|record| record.uri)
            .collect()
    }

    pub fn document_version(&self, uri: &DocumentUri) -> Option<SourceVersion> {
        self.shared.registry.read().get(uri).map(|record| record.version)
    }

    pub fn classpath_generation(&self, root: &Path) -> Option<ClasspathGeneration> {
        self.shared.classpath.read().generation(root)
    }

    /// Number of compilation engine invocations so far.
    pub fn recompute_count(&self) -> usize {
        self.shared.index.recompute_count()
    }

    /// Number of archive entries physically extracted so far.
    pub fn extraction_count(&self) -> usize {
        self.shared.resolver.extraction_count()
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.shared.resolver.temp_dir().to_path_buf()
    }

    /// The analysis of `uri`, recomputed through the serializer only when stale.
    pub async fn analysis(
        &self,
        uri: &DocumentUri,
        token: CancellationToken,
    ) -> Result<Arc<AnalysisEntry>, WorkspaceError> {
        self.ensure_open()?;
        if let Some(entry) = self.shared.peek(uri)? {
            return Ok(entry);
        }
        let uri = uri.clone();
        self.run(TaskKind::Mutating, token, move |shared, token| {
            shared.analyze(&uri, token)
        })
        .await
    }

    /// Analyses of several documents; documents that disappear meanwhile are skipped.
    pub async fn analyses(
        &self,
        uris: Vec<DocumentUri>,
        token: CancellationToken,
    ) -> Result<Vec<Arc<AnalysisEntry>>, WorkspaceError> {
        self.ensure_open()?;
        let fresh: Option<Vec<_>> = uris
            .iter()
            .map(|uri| self.shared.peek(uri).ok().flatten())
            .collect();
        if let Some(entries) = fresh {
            return Ok(entries);
        }
        self.run(TaskKind::Mutating, token, move |shared, token| {
            shared.analyze_all(&uris, token)
        })
        .await
    }

    /// Re-reads the build configuration of `root`. Returns whether the classpath changed.
    pub async fn refresh_classpath(&self, root: &Path) -> Result<bool, WorkspaceError> {
        let root = root.to_path_buf();
        self.run(TaskKind::Mutating, CancellationToken::new(), move |shared, _| {
            shared.refresh_classpath(&root)
        })
        .await
    }

    /// Stops accepting work, drains queued tasks and releases every resource.
    ///
    /// Idempotent; later requests fail with [`WorkspaceError::ServerClosed`].
    pub async fn shutdown(&self) -> Result<(), WorkspaceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let serializer = self.serializer.clone();
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || close(&serializer, &shared))
            .await
            .map_err(|_| WorkspaceError::Panicked)
    }

    fn ensure_open(&self) -> Result<(), WorkspaceError> {
        if self.is_closed() {
            Err(WorkspaceError::ServerClosed)
        } else {
            Ok(())
        }
    }

    /// Runs `f` as a serializer task and flattens task and workspace errors.
    async fn run<T, F>(
        &self,
        kind: TaskKind,
        token: CancellationToken,
        f: F,
    ) -> Result<T, WorkspaceError>
    where
        T: Send + 'static,
        F: FnOnce(&Shared, &CancellationToken) -> Result<T, WorkspaceError> + Send + 'static,
    {
        self.ensure_open()?;
        let shared = Arc::clone(&self.shared);
        let task = self.serializer.submit(kind, token, move |token| {
            match f(&shared, &token) {
                Err(WorkspaceError::Cancelled) => Err(Cancelled),
                other => Ok(other),
            }
        });
        task.await?
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            close(&self.serializer, &self.shared);
        }
    }
}

fn close(serializer: &TaskSerializer, shared: &Shared) {
    serializer.shutdown();
    shared.classpath.write().close();
    if let Err(err) = shared.resolver.close() {
        tracing::warn!(
            target: "kite.workspace",
            error = %err,
            "failed to delete extraction directory"
        );
    }
    serializer.release_workers();
    tracing::info!(target: "kite.workspace", "workspace shut down");
}

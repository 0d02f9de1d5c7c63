//! LSP-shaped entry points of [`Workspace`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use kite_core::identifier_at;
use kite_index::query::{self, SymbolMatch};
use kite_index::{AnalysisEntry, Symbol};
use kite_scheduler::{CancellationToken, TaskKind};
use kite_vfs::{CloseOutcome, DocumentUri};
use lsp_types::{
    CompletionParams, CompletionResponse, DidChangeTextDocumentParams,
    DidChangeWatchedFilesParams, DidChangeWorkspaceFoldersParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DocumentSymbolParams, DocumentSymbolResponse,
    ExecuteCommandParams, GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverContents,
    HoverParams, InitializeParams, InitializeResult, Location, MarkupContent, MarkupKind,
    ServerInfo, WorkspaceSymbolParams, WorkspaceSymbolResponse,
};

use crate::capabilities::{client_supports_snippets, server_capabilities};
use crate::convert::{
    completion_item, content_change_from_lsp, diagnostic_to_lsp, position_from_lsp,
    range_to_lsp, symbol_information, uri_from_lsp, uri_to_lsp,
};
use crate::init::{onboard_roots, InitializeReport};
use crate::watch::{categorize, ChangeCategory, FileChange, WatchedFilesReport};
use crate::{SourceVersion, Workspace, WorkspaceError};

const WORKSPACE_SYMBOL_LIMIT: usize = 128;

impl Workspace {
    /// Records client capabilities and onboards the initial workspace folders.
    pub async fn initialize(
        &self,
        params: InitializeParams,
    ) -> Result<InitializeResult, WorkspaceError> {
        self.shared
            .client_snippets
            .store(client_supports_snippets(&params.capabilities), Ordering::Relaxed);

        let roots = initial_roots(&params);
        let report = self.add_roots(roots).await?;
        if !report.is_success() {
            tracing::warn!(
                target: "kite.workspace",
                failed = report.failed().count(),
                "some workspace folders could not be added"
            );
        }

        Ok(InitializeResult {
            capabilities: server_capabilities(),
            server_info: Some(ServerInfo {
                name: "kite".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    /// Onboards workspace roots sequentially with progress notifications.
    pub async fn add_roots(&self, roots: Vec<PathBuf>) -> Result<InitializeReport, WorkspaceError> {
        let progress = self.serializer.progress();
        self.run(TaskKind::Mutating, CancellationToken::new(), move |shared, token| {
            onboard_roots(shared, &roots, &progress, token)
        })
        .await
    }

    pub async fn did_open(
        &self,
        params: DidOpenTextDocumentParams,
    ) -> Result<SourceVersion, WorkspaceError> {
        let uri = uri_from_lsp(&params.text_document.uri)?;
        let text = params.text_document.text;
        self.run(TaskKind::Mutating, CancellationToken::new(), move |shared, _| {
            Ok(shared.registry.write().open(uri, text))
        })
        .await
    }

    pub async fn did_change(
        &self,
        params: DidChangeTextDocumentParams,
    ) -> Result<SourceVersion, WorkspaceError> {
        let uri = uri_from_lsp(&params.text_document.uri)?;
        let changes: Vec<_> = params
            .content_changes
            .into_iter()
            .map(content_change_from_lsp)
            .collect();
        self.run(TaskKind::Mutating, CancellationToken::new(), move |shared, _| {
            Ok(shared.registry.write().apply_changes(&uri, &changes)?)
        })
        .await
    }

    /// Reverts the document to its disk content. Closing a document that is not open is a
    /// no-op.
    pub async fn did_close(
        &self,
        params: DidCloseTextDocumentParams,
    ) -> Result<CloseOutcome, WorkspaceError> {
        let uri = uri_from_lsp(&params.text_document.uri)?;
        self.run(TaskKind::Mutating, CancellationToken::new(), move |shared, _| {
            let outcome = shared.registry.write().close(&uri, &shared.resolver)?;
            if outcome == CloseOutcome::Removed {
                shared.index.forget(&uri);
            }
            Ok(outcome)
        })
        .await
    }

    /// Adds new folders. Removing folders is not supported and only logged.
    pub async fn did_change_workspace_folders(
        &self,
        params: DidChangeWorkspaceFoldersParams,
    ) -> Result<InitializeReport, WorkspaceError> {
        for folder in &params.event.removed {
            tracing::info!(
                target: "kite.workspace",
                folder = folder.uri.as_str(),
                "ignoring removal of workspace folder"
            );
        }
        let roots = params
            .event
            .added
            .iter()
            .filter_map(|folder| folder_path(&folder.uri))
            .collect();
        self.add_roots(roots).await
    }

    /// Keeps disk-backed sources current and refreshes the classpath of roots whose build
    /// configuration changed.
    pub async fn did_change_watched_files(
        &self,
        params: DidChangeWatchedFilesParams,
    ) -> Result<WatchedFilesReport, WorkspaceError> {
        let changes: Vec<(PathBuf, FileChange)> = params
            .changes
            .iter()
            .filter_map(|event| Some((folder_path(&event.uri)?, FileChange::from_lsp(event.typ)?)))
            .collect();
        self.run(TaskKind::Mutating, CancellationToken::new(), move |shared, _| {
            let mut report = WatchedFilesReport::default();
            let mut build_roots = BTreeSet::new();

            for (path, change) in changes {
                let category = {
                    let registry = shared.registry.read();
                    let classpath = shared.classpath.read();
                    categorize(&path, &registry, &classpath)
                        .map(|category| (category, classpath.root_for(&path).map(Path::to_path_buf)))
                };
                let uri = DocumentUri::File(path.clone());
                match category {
                    Some((ChangeCategory::Build, Some(root))) => {
                        build_roots.insert(root);
                    }
                    Some((ChangeCategory::Source, _)) if change == FileChange::Deleted => {
                        if shared.registry.write().remove(&uri) {
                            shared.index.forget(&uri);
                            report.sources_removed.push(uri);
                        }
                    }
                    Some((ChangeCategory::Source, _)) => {
                        let reloaded = shared.registry.write().reload_from_disk(&path);
                        match reloaded {
                            Ok(Some(_)) => report.sources_updated.push(uri),
                            Ok(None) if shared.registry.read().get(&uri).is_none() => {
                                shared.index.forget(&uri);
                                report.sources_removed.push(uri);
                            }
                            Ok(None) => {}
                            Err(err) => tracing::warn!(
                                target: "kite.workspace",
                                path = %path.display(),
                                error = %err,
                                "failed to reload watched file"
                            ),
                        }
                    }
                    _ => tracing::trace!(
                        target: "kite.workspace",
                        path = %path.display(),
                        "ignoring watched file event"
                    ),
                }
            }

            for root in build_roots {
                match shared.refresh_classpath(&root) {
                    Ok(true) => report.classpath_changed.push(root),
                    Ok(false) => {}
                    Err(err) => tracing::warn!(
                        target: "kite.workspace",
                        root = %root.display(),
                        error = %err,
                        "classpath refresh after build file change failed"
                    ),
                }
            }
            Ok(report)
        })
        .await
    }

    pub async fn diagnostics(
        &self,
        uri: &lsp_types::Uri,
    ) -> Result<Vec<lsp_types::Diagnostic>, WorkspaceError> {
        let entry = self
            .analysis(&uri_from_lsp(uri)?, CancellationToken::new())
            .await?;
        Ok(entry.diagnostics.iter().map(diagnostic_to_lsp).collect())
    }

    pub async fn hover(&self, params: HoverParams) -> Result<Option<Hover>, WorkspaceError> {
        let position = params.text_document_position_params;
        let uri = uri_from_lsp(&position.text_document.uri)?;
        let pos = position_from_lsp(position.position);
        let entry = self.analysis(&uri, CancellationToken::new()).await?;

        let (markdown, range) = if let Some(symbol) = query::symbol_at(&entry, pos) {
            (query::hover_markdown(&entry, symbol), symbol.range)
        } else if let Some(import) = query::import_at(&entry, pos) {
            (import_markdown(&import.path, import.on_classpath), import.range)
        } else {
            let Some((name, range)) = identifier_at(&entry.text, pos) else {
                return Ok(None);
            };
            if let Some(symbol) = local_declaration(&entry, &name) {
                (query::hover_markdown(&entry, symbol), range)
            } else if let Some(import) = query::import_for_name(&entry, &name) {
                (import_markdown(&import.path, import.on_classpath), range)
            } else {
                return Ok(None);
            }
        };

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: markdown,
            }),
            range: Some(range_to_lsp(range)),
        }))
    }

    /// Jumps to a declaration in the same file, in another workspace file, or into a classpath
    /// entry (archive entries come back as `jar:` URIs readable through
    /// [`Workspace::archive_contents`]).
    pub async fn definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>, WorkspaceError> {
        let position = params.text_document_position_params;
        let uri = uri_from_lsp(&position.text_document.uri)?;
        let pos = position_from_lsp(position.position);
        let entry = self.analysis(&uri, CancellationToken::new()).await?;

        if let Some(symbol) = query::symbol_at(&entry, pos) {
            return location(&entry.uri, symbol).map(Some);
        }

        let import = query::import_at(&entry, pos);
        let identifier = identifier_at(&entry.text, pos);
        let target = match (import, &identifier) {
            (Some(import), _) if !import.star => import.path.clone(),
            (_, Some((name, _))) => {
                if let Some(symbol) = local_declaration(&entry, name) {
                    return location(&entry.uri, symbol).map(Some);
                }
                match query::import_for_name(&entry, name) {
                    Some(import) => import.path.clone(),
                    None => return self.definition_by_name(&entry, name).await,
                }
            }
            _ => return Ok(None),
        };

        let peers = self.analyses(self.peers(&entry), CancellationToken::new()).await?;
        for peer in &peers {
            if let Some(symbol) = peer
                .symbols
                .iter()
                .find(|symbol| peer.qualified_name(symbol) == target)
            {
                return location(&peer.uri, symbol).map(Some);
            }
        }

        let (_, classpath) = self.shared.lookup(&entry.uri)?;
        match self.shared.locate_class(&classpath, &target) {
            Some(found) => Ok(Some(GotoDefinitionResponse::Scalar(Location {
                uri: uri_to_lsp(&found)?,
                range: lsp_types::Range::default(),
            }))),
            None => Ok(None),
        }
    }

    pub async fn completion(
        &self,
        params: CompletionParams,
    ) -> Result<Option<CompletionResponse>, WorkspaceError> {
        let position = params.text_document_position;
        let uri = uri_from_lsp(&position.text_document.uri)?;
        let pos = position_from_lsp(position.position);
        let entry = self.analysis(&uri, CancellationToken::new()).await?;

        let (prefix, member) = query::completion_prefix(&entry.text, pos);
        let peers = self.analyses(self.peers(&entry), CancellationToken::new()).await?;
        let classes = match &entry.root {
            Some(root) => self.shared.classpath.read().class_names(root),
            None => Arc::from(Vec::new()),
        };
        let candidates = query::complete(
            &prefix,
            member,
            peers.iter().map(Arc::as_ref),
            &classes,
            self.shared.snippets_enabled(),
        );

        Ok(Some(CompletionResponse::Array(
            candidates.into_iter().map(completion_item).collect(),
        )))
    }

    pub async fn document_symbols(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>, WorkspaceError> {
        let uri = uri_from_lsp(&params.text_document.uri)?;
        let entry = self.analysis(&uri, CancellationToken::new()).await?;
        let lsp_uri = uri_to_lsp(&entry.uri)?;
        let symbols = entry
            .symbols
            .iter()
            .map(|symbol| {
                symbol_information(
                    symbol.name.clone(),
                    symbol.kind,
                    Location::new(lsp_uri.clone(), range_to_lsp(symbol.range)),
                    symbol.container.clone(),
                )
            })
            .collect();
        Ok(Some(DocumentSymbolResponse::Flat(symbols)))
    }

    pub async fn workspace_symbols(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<WorkspaceSymbolResponse>, WorkspaceError> {
        let symbols = self
            .search_symbols(&params.query, WORKSPACE_SYMBOL_LIMIT)
            .await?
            .into_iter()
            .map(symbol_match_information)
            .collect::<Result<_, _>>()?;
        Ok(Some(WorkspaceSymbolResponse::Flat(symbols)))
    }

    /// Case-insensitive symbol search over every known document.
    pub async fn search_symbols(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SymbolMatch>, WorkspaceError> {
        let entries = self
            .analyses(self.documents(), CancellationToken::new())
            .await?;
        Ok(query::search_symbols(
            entries.iter().map(Arc::as_ref),
            query,
            limit,
        ))
    }

    /// Text of an archive entry (or any other resolvable document). Runs as a read-only task.
    pub async fn archive_contents(&self, uri: &str) -> Result<String, WorkspaceError> {
        let uri = DocumentUri::parse(uri)?;
        self.run(TaskKind::ReadOnly, CancellationToken::new(), move |shared, _| {
            Ok(shared.resolver.resolve(&uri)?.text)
        })
        .await
    }

    /// `workspace/executeCommand` for the commands in [`crate::COMMANDS`].
    pub async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>, WorkspaceError> {
        let first_arg = params
            .arguments
            .first()
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        match params.command.as_str() {
            "kite.refreshClasspath" => {
                let roots = match first_arg {
                    Some(uri) => {
                        let uri: lsp_types::Uri = uri
                            .parse()
                            .map_err(|_| WorkspaceError::InvalidArguments(uri.clone()))?;
                        vec![folder_path(&uri)
                            .ok_or_else(|| WorkspaceError::InvalidArguments(uri.as_str().to_string()))?]
                    }
                    None => self.roots(),
                };
                let mut changed = Vec::new();
                let mut failed = Vec::new();
                for root in roots {
                    match self.refresh_classpath(&root).await {
                        Ok(true) => changed.push(root.display().to_string()),
                        Ok(false) => {}
                        Err(WorkspaceError::Classpath(err)) => {
                            tracing::warn!(
                                target: "kite.workspace",
                                root = %root.display(),
                                error = %err,
                                "classpath refresh failed"
                            );
                            failed.push(root.display().to_string());
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok(Some(serde_json::json!({ "changed": changed, "failed": failed })))
            }
            "kite.archiveContents" => {
                let uri = first_arg.ok_or_else(|| {
                    WorkspaceError::InvalidArguments("expected a document URI".to_string())
                })?;
                let text = self.archive_contents(&uri).await?;
                Ok(Some(serde_json::Value::String(text)))
            }
            other => Err(WorkspaceError::UnknownCommand(other.to_string())),
        }
    }

    /// Documents sharing the root of `entry` (just `entry` itself for loose documents).
    fn peers(&self, entry: &AnalysisEntry) -> Vec<DocumentUri> {
        match &entry.root {
            Some(root) => self
                .shared
                .registry
                .read()
                .records_under(root)
                .into_iter()
                .map(|record| record.uri)
                .collect(),
            None => vec![entry.uri.clone()],
        }
    }

    async fn definition_by_name(
        &self,
        entry: &AnalysisEntry,
        name: &str,
    ) -> Result<Option<GotoDefinitionResponse>, WorkspaceError> {
        let peers = self.analyses(self.peers(entry), CancellationToken::new()).await?;
        let found = peers.iter().find_map(|peer| {
            peer.symbols
                .iter()
                .find(|symbol| symbol.container.is_none() && symbol.name == name)
                .map(|symbol| (peer, symbol))
        });
        match found {
            Some((peer, symbol)) => location(&peer.uri, symbol).map(Some),
            None => Ok(None),
        }
    }
}

fn initial_roots(params: &InitializeParams) -> Vec<PathBuf> {
    if let Some(folders) = &params.workspace_folders {
        return folders
            .iter()
            .filter_map(|folder| folder_path(&folder.uri))
            .collect();
    }
    #[allow(deprecated)]
    let root_uri = params.root_uri.as_ref();
    root_uri.and_then(folder_path).into_iter().collect()
}

fn folder_path(uri: &lsp_types::Uri) -> Option<PathBuf> {
    match DocumentUri::parse(uri.as_str()) {
        Ok(DocumentUri::File(path)) => Some(path),
        Ok(DocumentUri::Archive(_)) | Err(_) => {
            tracing::debug!(target: "kite.workspace", uri = uri.as_str(), "ignoring non-file URI");
            None
        }
    }
}

/// Declarations of `name` in `entry`, types first.
fn local_declaration<'a>(entry: &'a AnalysisEntry, name: &str) -> Option<&'a Symbol> {
    let mut candidates = entry.symbols.iter().filter(|symbol| symbol.name == name);
    let first = candidates.clone().find(|symbol| symbol.kind.is_type());
    first.or_else(|| candidates.next())
}

fn location(uri: &DocumentUri, symbol: &Symbol) -> Result<GotoDefinitionResponse, WorkspaceError> {
    Ok(GotoDefinitionResponse::Scalar(Location {
        uri: uri_to_lsp(uri)?,
        range: range_to_lsp(symbol.range),
    }))
}

fn import_markdown(path: &str, on_classpath: bool) -> String {
    let status = if on_classpath {
        "found on the classpath"
    } else {
        "not found on the classpath"
    };
    format!("```kotlin\nimport {path}\n```\n{status}")
}

fn symbol_match_information(
    found: SymbolMatch,
) -> Result<lsp_types::SymbolInformation, WorkspaceError> {
    let uri = DocumentUri::parse(&found.entry_uri)?;
    Ok(symbol_information(
        found.symbol.name,
        found.symbol.kind,
        Location::new(uri_to_lsp(&uri)?, range_to_lsp(found.symbol.range)),
        found.symbol.container,
    ))
}

use std::path::{Path, PathBuf};

use kite_classpath::ClasspathManager;
use kite_vfs::{DocumentUri, SourceRegistry};

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub enum ChangeCategory {
    Source,
    Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Created,
    Changed,
    Deleted,
}

impl FileChange {
    pub fn from_lsp(typ: lsp_types::FileChangeType) -> Option<Self> {
        match typ {
            lsp_types::FileChangeType::CREATED => Some(FileChange::Created),
            lsp_types::FileChangeType::CHANGED => Some(FileChange::Changed),
            lsp_types::FileChangeType::DELETED => Some(FileChange::Deleted),
            _ => None,
        }
    }
}

/// What a batch of watched-file events did to the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchedFilesReport {
    pub sources_updated: Vec<DocumentUri>,
    pub sources_removed: Vec<DocumentUri>,
    /// Roots whose classpath changed (and whose analyses were invalidated).
    pub classpath_changed: Vec<PathBuf>,
}

impl WatchedFilesReport {
    pub fn is_empty(&self) -> bool {
        self.sources_updated.is_empty()
            && self.sources_removed.is_empty()
            && self.classpath_changed.is_empty()
    }
}

/// Build files win over sources: a `.kt` file never configures the classpath, but a jar under
/// `libs/` does.
pub(crate) fn categorize(
    path: &Path,
    registry: &SourceRegistry,
    classpath: &ClasspathManager,
) -> Option<ChangeCategory> {
    if classpath.is_build_file(path) && classpath.root_for(path).is_some() {
        return Some(ChangeCategory::Build);
    }

    let known = registry
        .get(&DocumentUri::File(path.to_path_buf()))
        .is_some();
    let discoverable = registry
        .root_for(path)
        .is_some_and(|root| registry.discovery().matches(root, path));
    (known || discoverable).then_some(ChangeCategory::Source)
}

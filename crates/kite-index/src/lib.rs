//! Derived per-file analysis for Kite.
//!
//! The [`WorkspaceIndex`] is the only component that talks to the [`CompilationEngine`]. It
//! caches one immutable [`AnalysisEntry`] per document, tagged with the source version and
//! classpath generation it was computed from, and recomputes lazily when a lookup finds the tag
//! stale.

mod brace;
mod engine;
mod heuristic;
mod index;
pub mod query;

pub use engine::{CompilationEngine, CompileInput, CompileOutput, EngineError};
pub use heuristic::HeuristicEngine;
pub use index::{AnalysisEntry, IndexError, WorkspaceIndex};

use kite_core::{ClasspathGeneration, Range, SourceVersion};
use serde::Serialize;

/// Identity of the inputs an analysis was computed from. Cache hits require an exact match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AnalysisTag {
    pub source_version: SourceVersion,
    pub classpath_generation: ClasspathGeneration,
}

impl AnalysisTag {
    pub const fn new(source_version: SourceVersion, classpath_generation: ClasspathGeneration) -> Self {
        Self {
            source_version,
            classpath_generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Object,
    Function,
    Property,
    TypeAlias,
}

impl SymbolKind {
    pub fn is_type(self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Object | SymbolKind::TypeAlias
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Range of the declared name.
    pub range: Range,
    /// Enclosing class, interface or object.
    pub container: Option<String>,
    /// The declaration line, trimmed; used for hover.
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Import {
    /// Dotted path without the trailing `.*`.
    pub path: String,
    pub alias: Option<String>,
    pub star: bool,
    pub range: Range,
    /// Whether the classpath of the analysis provides the import.
    pub on_classpath: bool,
}

impl Import {
    /// The simple name this import brings into scope, if it is not a star import.
    pub fn visible_name(&self) -> Option<&str> {
        if self.star {
            return None;
        }
        self.alias
            .as_deref()
            .or_else(|| self.path.rsplit('.').next())
    }
}

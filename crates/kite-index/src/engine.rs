use kite_classpath::ClasspathSnapshot;
use kite_scheduler::CancellationToken;
use kite_vfs::DocumentUri;

use crate::{Diagnostic, Import, Symbol};

pub struct CompileInput<'a> {
    pub uri: &'a DocumentUri,
    pub text: &'a str,
    pub classpath: &'a ClasspathSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub package: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine could not analyze the source at all. Recorded as a diagnostic on the entry.
    #[error("compilation failed: {0}")]
    Compilation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("compilation cancelled")]
    Cancelled,
}

/// The expensive, stateful analyzer behind the workspace index.
///
/// Implementations are only ever called from one thread at a time and must poll `token` at safe
/// points, returning [`EngineError::Cancelled`] once it fires.
pub trait CompilationEngine: Send {
    fn compile(
        &mut self,
        input: &CompileInput<'_>,
        token: &CancellationToken,
    ) -> Result<CompileOutput, EngineError>;
}

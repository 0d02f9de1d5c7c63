//! Conversions between Kite's model types and `lsp-types`.

use kite_core::{Position, Range};
use kite_index::query::{CompletionCandidate, CompletionKind};
use kite_index::{Diagnostic, Severity, SymbolKind};
use kite_vfs::{ContentChange, DocumentUri, UriError};

use crate::WorkspaceError;

pub fn position_to_lsp(position: Position) -> lsp_types::Position {
    lsp_types::Position::new(position.line, position.character)
}

pub fn position_from_lsp(position: lsp_types::Position) -> Position {
    Position::new(position.line, position.character)
}

pub fn range_to_lsp(range: Range) -> lsp_types::Range {
    lsp_types::Range::new(position_to_lsp(range.start), position_to_lsp(range.end))
}

pub fn range_from_lsp(range: lsp_types::Range) -> Range {
    Range::new(position_from_lsp(range.start), position_from_lsp(range.end))
}

pub fn uri_from_lsp(uri: &lsp_types::Uri) -> Result<DocumentUri, WorkspaceError> {
    Ok(DocumentUri::parse(uri.as_str())?)
}

pub fn uri_to_lsp(uri: &DocumentUri) -> Result<lsp_types::Uri, WorkspaceError> {
    let text = uri.to_string();
    text.parse()
        .map_err(|_| WorkspaceError::InvalidUri(UriError::Invalid(text)))
}

pub fn content_change_from_lsp(change: lsp_types::TextDocumentContentChangeEvent) -> ContentChange {
    ContentChange {
        range: change.range.map(range_from_lsp),
        text: change.text,
    }
}

pub fn diagnostic_to_lsp(diagnostic: &Diagnostic) -> lsp_types::Diagnostic {
    let severity = match diagnostic.severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Information => lsp_types::DiagnosticSeverity::INFORMATION,
    };
    lsp_types::Diagnostic {
        range: range_to_lsp(diagnostic.range),
        severity: Some(severity),
        code: diagnostic
            .code
            .clone()
            .map(lsp_types::NumberOrString::String),
        source: Some("kite".to_string()),
        message: diagnostic.message.clone(),
        ..lsp_types::Diagnostic::default()
    }
}

pub fn symbol_kind_to_lsp(kind: SymbolKind) -> lsp_types::SymbolKind {
    match kind {
        SymbolKind::Class | SymbolKind::TypeAlias => lsp_types::SymbolKind::CLASS,
        SymbolKind::Interface => lsp_types::SymbolKind::INTERFACE,
        SymbolKind::Object => lsp_types::SymbolKind::OBJECT,
        SymbolKind::Function => lsp_types::SymbolKind::FUNCTION,
        SymbolKind::Property => lsp_types::SymbolKind::PROPERTY,
    }
}

#[allow(deprecated)]
pub fn symbol_information(
    name: String,
    kind: SymbolKind,
    location: lsp_types::Location,
    container_name: Option<String>,
) -> lsp_types::SymbolInformation {
    lsp_types::SymbolInformation {
        name,
        kind: symbol_kind_to_lsp(kind),
        tags: None,
        deprecated: None,
        location,
        container_name,
    }
}

fn completion_kind_to_lsp(kind: CompletionKind) -> lsp_types::CompletionItemKind {
    match kind {
        CompletionKind::Keyword => lsp_types::CompletionItemKind::KEYWORD,
        CompletionKind::Class => lsp_types::CompletionItemKind::CLASS,
        CompletionKind::Symbol(kind) => match kind {
            SymbolKind::Class | SymbolKind::TypeAlias => lsp_types::CompletionItemKind::CLASS,
            SymbolKind::Interface => lsp_types::CompletionItemKind::INTERFACE,
            SymbolKind::Object => lsp_types::CompletionItemKind::MODULE,
            SymbolKind::Function => lsp_types::CompletionItemKind::FUNCTION,
            SymbolKind::Property => lsp_types::CompletionItemKind::PROPERTY,
        },
    }
}

pub fn completion_item(candidate: CompletionCandidate) -> lsp_types::CompletionItem {
    let kind = completion_kind_to_lsp(candidate.kind);
    let (insert_text, insert_text_format) = match candidate.snippet {
        Some(snippet) => (Some(snippet), Some(lsp_types::InsertTextFormat::SNIPPET)),
        None => (None, None),
    };
    lsp_types::CompletionItem {
        label: candidate.label,
        kind: Some(kind),
        detail: candidate.detail,
        insert_text,
        insert_text_format,
        ..lsp_types::CompletionItem::default()
    }
}

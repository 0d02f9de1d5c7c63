//! Read-side helpers over analysis entries: lookups by position, completion and symbol search.

use std::collections::HashSet;

use kite_core::{is_identifier_char, LineIndex, Position};
use serde::Serialize;

use crate::{AnalysisEntry, Import, Symbol, SymbolKind};

const KEYWORDS: &[&str] = &[
    "as", "break", "class", "continue", "data", "do", "else", "false", "finally", "for", "fun",
    "if", "import", "in", "interface", "internal", "is", "null", "object", "override", "package",
    "private", "public", "return", "sealed", "super", "this", "throw", "true", "try", "typealias",
    "val", "var", "when", "while",
];

const MAX_COMPLETIONS: usize = 200;

pub fn symbol_at(entry: &AnalysisEntry, position: Position) -> Option<&Symbol> {
    entry
        .symbols
        .iter()
        .find(|symbol| symbol.range.contains(position))
}

pub fn import_at(entry: &AnalysisEntry, position: Position) -> Option<&Import> {
    entry
        .imports
        .iter()
        .find(|import| import.range.contains(position))
}

/// The explicit import that brings `name` into scope.
pub fn import_for_name<'a>(entry: &'a AnalysisEntry, name: &str) -> Option<&'a Import> {
    entry
        .imports
        .iter()
        .find(|import| import.visible_name() == Some(name))
}

pub fn hover_markdown(entry: &AnalysisEntry, symbol: &Symbol) -> String {
    format!(
        "```kotlin\n{}\n```\n{}",
        symbol.detail,
        entry.qualified_name(symbol)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Keyword,
    Symbol(SymbolKind),
    /// A class found on the classpath.
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionCandidate {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
    /// Snippet text (`$1`/`$0` placeholders) for clients that support snippets.
    pub snippet: Option<String>,
}

/// The identifier fragment before `position` and whether it follows a `.`.
pub fn completion_prefix(text: &str, position: Position) -> (String, bool) {
    let offset = LineIndex::new(text).offset(text, position);
    let before = &text[..offset];
    let start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_identifier_char(*c))
        .last()
        .map_or(offset, |(idx, _)| idx);
    let member = before[..start].ends_with('.');
    (before[start..].to_string(), member)
}

/// Completion candidates for `prefix`.
///
/// Member completion (after `.`) offers members and functions of every analyzed file; otherwise
/// keywords, top-level declarations, imported names and classpath classes are offered.
pub fn complete<'a>(
    prefix: &str,
    member: bool,
    entries: impl IntoIterator<Item = &'a AnalysisEntry>,
    classpath_classes: &[String],
    snippets: bool,
) -> Vec<CompletionCandidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut push = |candidate: CompletionCandidate| {
        if matches_prefix(&candidate.label, prefix)
            && seen.insert((candidate.label.clone(), candidate.kind))
        {
            candidates.push(candidate);
        }
    };

    for entry in entries {
        for symbol in &entry.symbols {
            let wanted = if member {
                symbol.container.is_some() || symbol.kind == SymbolKind::Function
            } else {
                symbol.container.is_none()
            };
            if wanted {
                push(symbol_candidate(symbol, snippets));
            }
        }
        if !member {
            for name in entry.imports.iter().filter_map(Import::visible_name) {
                push(CompletionCandidate {
                    label: name.to_string(),
                    kind: CompletionKind::Class,
                    detail: None,
                    snippet: None,
                });
            }
        }
    }

    if !member {
        for keyword in KEYWORDS {
            push(CompletionCandidate {
                label: keyword.to_string(),
                kind: CompletionKind::Keyword,
                detail: None,
                snippet: None,
            });
        }
        for class in classpath_classes {
            let simple = class.rsplit('.').next().unwrap_or(class);
            push(CompletionCandidate {
                label: simple.to_string(),
                kind: CompletionKind::Class,
                detail: Some(class.clone()),
                snippet: None,
            });
        }
    }

    candidates.sort_by(|a, b| {
        rank(&a.label, prefix)
            .cmp(&rank(&b.label, prefix))
            .then_with(|| a.label.cmp(&b.label))
    });
    candidates.truncate(MAX_COMPLETIONS);
    candidates
}

fn symbol_candidate(symbol: &Symbol, snippets: bool) -> CompletionCandidate {
    let snippet = (snippets && symbol.kind == SymbolKind::Function)
        .then(|| format!("{}($1)$0", symbol.name));
    CompletionCandidate {
        label: symbol.name.clone(),
        kind: CompletionKind::Symbol(symbol.kind),
        detail: Some(symbol.detail.clone()),
        snippet,
    }
}

fn matches_prefix(label: &str, prefix: &str) -> bool {
    label.len() >= prefix.len()
        && label
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Case-sensitive prefix matches sort before case-insensitive ones.
fn rank(label: &str, prefix: &str) -> u8 {
    if label.starts_with(prefix) {
        0
    } else {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolMatch {
    pub entry_uri: String,
    pub qualified_name: String,
    pub symbol: Symbol,
}

/// Case-insensitive workspace symbol search: exact names first, then prefixes, then substrings.
pub fn search_symbols<'a>(
    entries: impl IntoIterator<Item = &'a AnalysisEntry>,
    query: &str,
    limit: usize,
) -> Vec<SymbolMatch> {
    let query = query.to_lowercase();
    let mut matches: Vec<(u8, SymbolMatch)> = Vec::new();
    for entry in entries {
        for symbol in &entry.symbols {
            let name = symbol.name.to_lowercase();
            let score = if name == query {
                0
            } else if name.starts_with(&query) {
                1
            } else if name.contains(&query) {
                2
            } else {
                continue;
            };
            matches.push((
                score,
                SymbolMatch {
                    entry_uri: entry.uri.to_string(),
                    qualified_name: entry.qualified_name(symbol),
                    symbol: symbol.clone(),
                },
            ));
        }
    }
    matches.sort_by(|(sa, a), (sb, b)| {
        sa.cmp(sb)
            .then_with(|| a.qualified_name.cmp(&b.qualified_name))
            .then_with(|| a.entry_uri.cmp(&b.entry_uri))
    });
    matches
        .into_iter()
        .take(limit)
        .map(|(_, found)| found)
        .collect()
}

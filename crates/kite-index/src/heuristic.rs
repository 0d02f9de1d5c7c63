use kite_core::{LineIndex, Range};
use kite_scheduler::CancellationToken;
use regex::Regex;

use crate::brace::check_delimiters;
use crate::{
    CompilationEngine, CompileInput, CompileOutput, Diagnostic, EngineError, Import, Severity,
    Symbol, SymbolKind,
};

/// Line-based Kotlin analyzer.
///
/// It extracts top-level and member declarations, the package and imports, checks delimiter
/// balance and flags `TODO`/`FIXME` comments. It is fast and forgiving, never a type checker.
pub struct HeuristicEngine {
    declaration: Regex,
    import: Regex,
    package: Regex,
    todo: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Type,
    /// Function or property body; declarations inside are locals.
    Body,
}

struct Scope {
    name: String,
    kind: ScopeKind,
    /// Brace depth at which the declaring line started.
    depth: usize,
}

impl HeuristicEngine {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            declaration: Regex::new(
                r"^\s*(?:(?:public|private|internal|protected|open|abstract|sealed|data|enum|annotation|inner|inline|value|override|suspend|operator|infix|tailrec|external|const|lateinit|expect|actual|companion|final)\s+)*(class|interface|object|fun|val|var|typealias)\s+(?:<[^>]*>\s*)?(?:[A-Za-z_][\w<>?,. ]*\.)?([A-Za-z_]\w*)",
            )?,
            import: Regex::new(
                r"^\s*import\s+([A-Za-z_][\w.]*?)(\.\*)?(?:\s+as\s+([A-Za-z_]\w*))?\s*;?\s*$",
            )?,
            package: Regex::new(r"^\s*package\s+([A-Za-z_][\w.]*)")?,
            todo: Regex::new(r"//\s*(TODO|FIXME)\b:?\s*(.*)$")?,
        })
    }
}

impl CompilationEngine for HeuristicEngine {
    fn compile(
        &mut self,
        input: &CompileInput<'_>,
        token: &CancellationToken,
    ) -> Result<CompileOutput, EngineError> {
        let text = input.text;
        if text.contains('\0') {
            return Err(EngineError::Compilation(
                "source contains NUL bytes and is not text".to_string(),
            ));
        }

        let index = LineIndex::new(text);
        let range_of = |start: usize, end: usize| {
            Range::new(index.position(text, start), index.position(text, end))
        };

        let mut out = CompileOutput::default();
        let mut scopes: Vec<Scope> = Vec::new();
        let mut depth = 0usize;
        let mut in_block_comment = false;
        let mut line_start = 0usize;

        for line in text.split_inclusive('\n') {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let offset = line_start;
            line_start += line.len();
            let content = line.trim_end_matches(['\n', '\r']);

            if let Some(cap) = self.todo.captures(content) {
                if let (Some(whole), Some(tag)) = (cap.get(0), cap.get(1)) {
                    let note = cap.get(2).map_or("", |m| m.as_str()).trim();
                    out.diagnostics.push(Diagnostic {
                        range: range_of(offset + whole.start(), offset + whole.end()),
                        severity: Severity::Warning,
                        code: Some("todo".to_string()),
                        message: if note.is_empty() {
                            tag.as_str().to_string()
                        } else {
                            format!("{}: {note}", tag.as_str())
                        },
                    });
                }
            }

            if in_block_comment {
                in_block_comment = !content.contains("*/");
                continue;
            }
            let trimmed = content.trim_start();
            if trimmed.starts_with("/*") {
                in_block_comment = !trimmed.contains("*/");
                continue;
            }

            let code = strip_line_comment(content);
            scopes.retain(|scope| depth > scope.depth);

            if let Some(cap) = self.package.captures(code) {
                out.package = cap.get(1).map(|m| m.as_str().to_string());
            } else if let Some(cap) = self.import.captures(code) {
                if let Some(path) = cap.get(1) {
                    let star = cap.get(2);
                    let end = star.map_or(path.end(), |m| m.end());
                    let path_str = path.as_str().to_string();
                    let on_classpath = if star.is_some() {
                        input.classpath.has_package(&path_str)
                    } else {
                        input.classpath.has_class(&path_str)
                            || path_str
                                .rsplit_once('.')
                                .is_some_and(|(owner, _)| input.classpath.has_class(owner))
                    };
                    out.imports.push(Import {
                        path: path_str,
                        alias: cap.get(3).map(|m| m.as_str().to_string()),
                        star: star.is_some(),
                        range: range_of(offset + path.start(), offset + end),
                        on_classpath,
                    });
                }
            }

            let depth_before = depth;
            depth = depth.saturating_add_signed(brace_delta(code));

            let Some(cap) = self.declaration.captures(code) else {
                continue;
            };
            let (Some(keyword), Some(name)) = (cap.get(1), cap.get(2)) else {
                continue;
            };
            if scopes.last().is_some_and(|scope| scope.kind == ScopeKind::Body) {
                continue;
            }

            let kind = match keyword.as_str() {
                "class" => SymbolKind::Class,
                "interface" => SymbolKind::Interface,
                "object" => SymbolKind::Object,
                "fun" => SymbolKind::Function,
                "typealias" => SymbolKind::TypeAlias,
                _ => SymbolKind::Property,
            };
            let container = scopes
                .iter()
                .rev()
                .find(|scope| scope.kind == ScopeKind::Type)
                .map(|scope| scope.name.clone());
            out.symbols.push(Symbol {
                name: name.as_str().to_string(),
                kind,
                range: range_of(offset + name.start(), offset + name.end()),
                container,
                detail: declaration_detail(code),
            });

            if depth > depth_before {
                scopes.push(Scope {
                    name: name.as_str().to_string(),
                    kind: if kind.is_type() {
                        ScopeKind::Type
                    } else {
                        ScopeKind::Body
                    },
                    depth: depth_before,
                });
            }
        }

        out.diagnostics
            .extend(check_delimiters(text).into_iter().map(|err| Diagnostic {
                range: range_of(err.offset, err.offset + 1),
                severity: Severity::Error,
                code: Some("syntax".to_string()),
                message: err.message,
            }));
        out.diagnostics
            .sort_by(|a, b| a.range.start.cmp(&b.range.start));
        Ok(out)
    }
}

/// The part of `line` before a `//` comment that is not inside a string literal.
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// Net change in brace depth for one line of code, ignoring string and char literals.
fn brace_delta(code: &str) -> isize {
    let mut delta = 0isize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in code.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' => delta += 1,
                '}' => delta -= 1,
                _ => {}
            },
        }
    }
    delta
}

fn declaration_detail(code: &str) -> String {
    let trimmed = code.trim();
    let head = trimmed
        .strip_suffix('{')
        .map(str::trim_end)
        .unwrap_or(trimmed);
    head.to_string()
}

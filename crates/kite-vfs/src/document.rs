use kite_core::{LineIndex, Position, Range};

/// An LSP-style content change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    /// The range of text to replace. If `None`, the entire document is replaced.
    pub range: Option<Range>,
    /// Replacement text.
    pub text: String,
}

impl ContentChange {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    pub fn replace(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid range {start:?}..{end:?}")]
    InvalidRange { start: Position, end: Position },
}

/// Applies a sequence of incremental changes in order and returns the resulting text.
///
/// Positions are UTF-16 based; positions past the end of a line or of the document are clamped.
/// A range whose start lies after its end is rejected and leaves `text` untouched.
pub fn apply_content_changes(text: &str, changes: &[ContentChange]) -> Result<String, DocumentError> {
    let mut current = text.to_string();
    for change in changes {
        let Some(range) = change.range else {
            current.clone_from(&change.text);
            continue;
        };

        let index = LineIndex::new(&current);
        let start = index.offset(&current, range.start);
        let end = index.offset(&current, range.end);
        if start > end {
            return Err(DocumentError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        current.replace_range(start..end, &change.text);
    }
    Ok(current)
}

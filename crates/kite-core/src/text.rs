//! Line indexing and UTF-16 position conversions.

use crate::{Position, Range};

/// Pre-computed line start offsets for a particular text snapshot.
///
/// `\n`, `\r\n` and a lone `\r` all terminate a line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    text_len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut line_starts = vec![0];
        let mut i = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => {
                    line_starts.push(i + 1);
                    i += 1;
                }
                b'\r' => {
                    if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                        line_starts.push(i + 2);
                        i += 2;
                    } else {
                        line_starts.push(i + 1);
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }

        Self {
            line_starts,
            text_len: text.len(),
        }
    }

    #[inline]
    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Byte range of `line`, excluding its terminator.
    fn line_bounds(&self, text: &str, line: usize) -> (usize, usize) {
        let start = self.line_starts[line];
        let mut end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text_len);

        let bytes = text.as_bytes();
        if end > start && bytes[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && bytes[end - 1] == b'\r' {
            end -= 1;
        }
        (start, end)
    }

    /// Converts an LSP position into a byte offset into `text`.
    ///
    /// Lines past the end map to the end of the text; columns past the end of a line map to the
    /// line end, and columns that split a surrogate pair map to the start of that character.
    pub fn offset(&self, text: &str, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return self.text_len;
        }

        let (start, end) = self.line_bounds(text, line);
        start + utf16_column_to_byte_offset_clamped(&text[start..end], position.character)
    }

    /// Converts a byte offset into an LSP position. Offsets past the end are clamped.
    pub fn position(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(self.text_len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(insert) => insert.saturating_sub(1),
        };
        let start = self.line_starts[line];
        let mut offset = offset;
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let character = utf16_len(&text[start..offset]) as u32;
        Position::new(line as u32, character)
    }

    /// Position just past the last character of the text.
    pub fn end_position(&self, text: &str) -> Position {
        self.position(text, self.text_len)
    }
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

fn utf16_column_to_byte_offset_clamped(line: &str, column_utf16: u32) -> usize {
    let mut col: u32 = 0;
    for (idx, ch) in line.char_indices() {
        let ch_len = ch.len_utf16() as u32;
        if col >= column_utf16 || col + ch_len > column_utf16 {
            return idx;
        }
        col = col.saturating_add(ch_len);
    }
    line.len()
}

pub fn is_identifier_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Returns the identifier touching `position` together with its range.
///
/// A cursor placed directly after the last character of an identifier still selects it.
pub fn identifier_at(text: &str, position: Position) -> Option<(String, Range)> {
    let index = LineIndex::new(text);
    let offset = index.offset(text, position);

    let mut start = offset;
    while let Some(c) = text[..start].chars().next_back() {
        if !is_identifier_char(c) {
            break;
        }
        start -= c.len_utf8();
    }

    let mut end = offset;
    while let Some(c) = text[end..].chars().next() {
        if !is_identifier_char(c) {
            break;
        }
        end += c.len_utf8();
    }

    if start == end {
        return None;
    }
    let word = &text[start..end];
    if word.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let range = Range::new(index.position(text, start), index.position(text, end));
    Some((word.to_string(), range))
}

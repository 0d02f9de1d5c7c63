//! Core shared types for Kite.
//!
//! This crate is intentionally small: text positions, line indexing, source discovery helpers
//! and a couple of process-level utilities shared by every other crate.

mod fs;
mod panic;
mod text;

pub use fs::{collect_files_with_extensions, is_excluded_dir};
pub use panic::panic_payload_to_str;
pub use text::{identifier_at, is_identifier_char, LineIndex};

use serde::{Deserialize, Serialize};

/// A position in a text document expressed as (line, UTF-16 code unit offset).
///
/// This matches the Language Server Protocol definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open range in a text document expressed with LSP positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[inline]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn point(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Returns whether `pos` lies within the range (end inclusive, so a cursor placed right
    /// after an identifier still hits it).
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }
}

/// A textual edit described by a range replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

impl TextEdit {
    #[inline]
    pub fn new(range: Range, new_text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: new_text.into(),
        }
    }
}

/// Monotonic per-document version counter maintained by the source registry.
pub type SourceVersion = u64;

/// Monotonic per-root classpath generation maintained by the classpath manager.
pub type ClasspathGeneration = u64;

//! Delimiter balance check over Kotlin source, skipping comments and string literals.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DelimiterError {
    pub message: String,
    /// Byte offset of the offending delimiter.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    LineComment,
    /// Kotlin block comments nest.
    BlockComment(usize),
    String,
    RawString,
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delim {
    Brace,
    Paren,
    Bracket,
}

impl Delim {
    fn open(b: u8) -> Option<Self> {
        match b {
            b'{' => Some(Delim::Brace),
            b'(' => Some(Delim::Paren),
            b'[' => Some(Delim::Bracket),
            _ => None,
        }
    }

    fn close(b: u8) -> Option<Self> {
        match b {
            b'}' => Some(Delim::Brace),
            b')' => Some(Delim::Paren),
            b']' => Some(Delim::Bracket),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Delim::Brace => "brace",
            Delim::Paren => "parenthesis",
            Delim::Bracket => "bracket",
        }
    }
}

pub(crate) fn check_delimiters(text: &str) -> Vec<DelimiterError> {
    let bytes = text.as_bytes();
    let starts_with = |i: usize, pat: &[u8]| bytes[i..].starts_with(pat);

    let mut mode = Mode::Normal;
    let mut stack: Vec<(Delim, usize)> = Vec::new();
    let mut errors = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match mode {
            Mode::Normal => {
                if starts_with(i, b"//") {
                    mode = Mode::LineComment;
                    i += 2;
                    continue;
                }
                if starts_with(i, b"/*") {
                    mode = Mode::BlockComment(1);
                    i += 2;
                    continue;
                }
                if starts_with(i, b"\"\"\"") {
                    mode = Mode::RawString;
                    i += 3;
                    continue;
                }
                match b {
                    b'"' => mode = Mode::String,
                    b'\'' => mode = Mode::Char,
                    _ => {
                        if let Some(open) = Delim::open(b) {
                            stack.push((open, i));
                        } else if let Some(close) = Delim::close(b) {
                            match stack.last() {
                                Some((open, _)) if *open == close => {
                                    stack.pop();
                                }
                                // Keep the opener and report the stray closer.
                                Some(_) => errors.push(DelimiterError {
                                    message: format!("mismatched closing {}", close.name()),
                                    offset: i,
                                }),
                                None => errors.push(DelimiterError {
                                    message: format!("unmatched closing {}", close.name()),
                                    offset: i,
                                }),
                            }
                        }
                    }
                }
            }
            Mode::LineComment => {
                if b == b'\n' {
                    mode = Mode::Normal;
                }
            }
            Mode::BlockComment(depth) => {
                if starts_with(i, b"/*") {
                    mode = Mode::BlockComment(depth + 1);
                    i += 2;
                    continue;
                }
                if starts_with(i, b"*/") {
                    mode = if depth == 1 {
                        Mode::Normal
                    } else {
                        Mode::BlockComment(depth - 1)
                    };
                    i += 2;
                    continue;
                }
            }
            Mode::String | Mode::Char => {
                let quote = if mode == Mode::String { b'"' } else { b'\'' };
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                // Unterminated literals end at the line break.
                if b == quote || b == b'\n' {
                    mode = Mode::Normal;
                }
            }
            Mode::RawString => {
                if starts_with(i, b"\"\"\"") {
                    mode = Mode::Normal;
                    i += 3;
                    continue;
                }
            }
        }
        i += 1;
    }

    for (delim, offset) in stack.into_iter().rev() {
        errors.push(DelimiterError {
            message: format!("unclosed {}", delim.name()),
            offset,
        });
    }
    errors.sort_by_key(|err| err.offset);
    errors
}

//! Offset-preserving text helpers shared by the scanners.
//!
//! Every helper here keeps byte offsets stable: masked text has exactly the
//! same length as its input, so a match found in masked text can be mapped
//! straight back to the original source through [`LineIndex`].

use std::ops::{ControlFlow, Range};

/// Compute byte offsets for each line in the source text.
/// Returns a vector where index i contains the byte offset where line i starts.
pub(crate) fn compute_line_offsets(sql: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    for (i, byte) in sql.bytes().enumerate() {
        if byte == b'\n' {
            offsets.push(i + 1);
        }
    }
    offsets
}

/// Maps byte offsets to 0-based `(line, column)` pairs, columns counted in characters.
///
/// Built once per file and reused for every reported position.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            line_starts: compute_line_offsets(text),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where `line` starts.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Byte range of `line` without its terminating newline.
    pub fn line_range(&self, line: usize) -> Option<Range<usize>> {
        let start = self.line_start(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        Some(start..end.max(start))
    }

    /// `(line, column)` of a byte offset. Offsets past the end clamp to the last position.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = floor_char_boundary(self.text, offset.min(self.text.len()));
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let column = self.text[start..offset].chars().count();
        (line as u32, column as u32)
    }

    /// Byte offset of a 0-based `(line, column)` pair. Columns past the line end clamp to it.
    pub fn offset(&self, line: usize, column: usize) -> usize {
        let Some(range) = self.line_range(line) else {
            return self.text.len();
        };
        let line_text = &self.text[range.clone()];
        line_text
            .char_indices()
            .nth(column)
            .map(|(i, _)| range.start + i)
            .unwrap_or(range.end)
    }

    /// `(line, start_col, end_col)` of a byte range that does not span lines.
    pub fn span(&self, range: &Range<usize>) -> (u32, u32, u32) {
        let (line, start_col) = self.position(range.start);
        let (_, end_col) = self.position(range.end);
        (line, start_col, end_col)
    }
}

fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment(u32),
    SingleQuote,
    DoubleQuote,
    Bracket,
}

/// Walks `range` of `text`, calling `visit` for every byte that is plain code:
/// not inside a comment, a string literal, a quoted or a bracketed identifier.
///
/// Delimiter bytes themselves are not reported. T-SQL block comments nest.
fn for_each_code_byte<F>(text: &str, range: Range<usize>, mut visit: F)
where
    F: FnMut(usize, u8) -> ControlFlow<()>,
{
    let bytes = text.as_bytes();
    let end = range.end.min(bytes.len());
    let mut state = LexState::Code;
    let mut i = range.start;

    while i < end {
        let byte = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            LexState::Code => match byte {
                b'-' if next == Some(b'-') => {
                    state = LexState::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    state = LexState::BlockComment(1);
                    i += 1;
                }
                b'\'' => state = LexState::SingleQuote,
                b'"' => state = LexState::DoubleQuote,
                b'[' => state = LexState::Bracket,
                _ => {
                    if visit(i, byte).is_break() {
                        return;
                    }
                }
            },
            LexState::LineComment => {
                if byte == b'\n' {
                    state = LexState::Code;
                }
            }
            LexState::BlockComment(depth) => {
                if byte == b'*' && next == Some(b'/') {
                    state = if depth == 1 {
                        LexState::Code
                    } else {
                        LexState::BlockComment(depth - 1)
                    };
                    i += 1;
                } else if byte == b'/' && next == Some(b'*') {
                    state = LexState::BlockComment(depth + 1);
                    i += 1;
                }
            }
            LexState::SingleQuote => {
                if byte == b'\'' {
                    if next == Some(b'\'') {
                        i += 1;
                    } else {
                        state = LexState::Code;
                    }
                }
            }
            LexState::DoubleQuote => {
                if byte == b'"' {
                    if next == Some(b'"') {
                        i += 1;
                    } else {
                        state = LexState::Code;
                    }
                }
            }
            LexState::Bracket => {
                if byte == b']' {
                    if next == Some(b']') {
                        i += 1;
                    } else {
                        state = LexState::Code;
                    }
                }
            }
        }
        i += 1;
    }
}

/// Replace comments with spaces, keeping newlines and byte offsets.
pub fn blank_comments(sql: &str) -> String {
    mask(sql, false)
}

/// Like [`blank_comments`], and also blank the contents of string literals
/// (the quotes stay, so `N'abc'` becomes `N'   '`).
pub fn blank_comments_and_strings(sql: &str) -> String {
    mask(sql, true)
}

fn mask(sql: &str, blank_strings: bool) -> String {
    let bytes = sql.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = LexState::Code;
    let mut i = 0;

    let blank = |out: &mut Vec<u8>, at: usize| {
        if out[at] != b'\n' && out[at] != b'\r' {
            out[at] = b' ';
        }
    };

    while i < bytes.len() {
        let byte = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            LexState::Code => match byte {
                b'-' if next == Some(b'-') => {
                    state = LexState::LineComment;
                    blank(&mut out, i);
                    blank(&mut out, i + 1);
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    state = LexState::BlockComment(1);
                    blank(&mut out, i);
                    blank(&mut out, i + 1);
                    i += 1;
                }
                b'\'' => state = LexState::SingleQuote,
                b'"' => state = LexState::DoubleQuote,
                b'[' => state = LexState::Bracket,
                _ => {}
            },
            LexState::LineComment => {
                if byte == b'\n' {
                    state = LexState::Code;
                } else {
                    blank(&mut out, i);
                }
            }
            LexState::BlockComment(depth) => {
                blank(&mut out, i);
                if byte == b'*' && next == Some(b'/') {
                    blank(&mut out, i + 1);
                    state = if depth == 1 {
                        LexState::Code
                    } else {
                        LexState::BlockComment(depth - 1)
                    };
                    i += 1;
                } else if byte == b'/' && next == Some(b'*') {
                    blank(&mut out, i + 1);
                    state = LexState::BlockComment(depth + 1);
                    i += 1;
                }
            }
            LexState::SingleQuote => {
                if byte == b'\'' {
                    if next == Some(b'\'') {
                        if blank_strings {
                            blank(&mut out, i);
                            blank(&mut out, i + 1);
                        }
                        i += 1;
                    } else {
                        state = LexState::Code;
                    }
                } else if blank_strings {
                    blank(&mut out, i);
                }
            }
            LexState::DoubleQuote => {
                if byte == b'"' {
                    if next == Some(b'"') {
                        i += 1;
                    } else {
                        state = LexState::Code;
                    }
                }
            }
            LexState::Bracket => {
                if byte == b']' {
                    if next == Some(b']') {
                        i += 1;
                    } else {
                        state = LexState::Code;
                    }
                }
            }
        }
        i += 1;
    }

    // Whole characters are always blanked together, so this stays valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Byte offset of the `)` closing the `(` at `open`.
pub fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    if text.as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut found = None;
    for_each_code_byte(text, open..text.len(), |i, byte| {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    found = Some(i);
                    return ControlFlow::Break(());
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    });
    found
}

/// Split `range` on commas that are not nested in parentheses, literals or comments.
///
/// Pieces are trimmed of surrounding whitespace; empty pieces are dropped.
pub fn split_top_level(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut piece_start = range.start;
    for_each_code_byte(text, range.clone(), |i, byte| {
        match byte {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                pieces.push(piece_start..i);
                piece_start = i + 1;
            }
            _ => {}
        }
        ControlFlow::Continue(())
    });
    pieces.push(piece_start..range.end.min(text.len()));

    pieces
        .into_iter()
        .map(|piece| trim_range(text, piece))
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// First occurrence of `keyword` as a whole word at parenthesis depth 0 inside `range`.
pub fn find_top_level_keyword(text: &str, range: Range<usize>, keyword: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let needle = keyword.as_bytes();
    let mut depth = 0usize;
    let mut found = None;
    for_each_code_byte(text, range.clone(), |i, byte| {
        match byte {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && byte.eq_ignore_ascii_case(&needle[0]) => {
                let end = i + needle.len();
                if end <= range.end
                    && bytes[i..end].eq_ignore_ascii_case(needle)
                    && !is_word_byte_at(bytes, i.wrapping_sub(1))
                    && !is_word_byte_at(bytes, end)
                {
                    found = Some(i);
                    return ControlFlow::Break(());
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    });
    found
}

fn is_word_byte_at(bytes: &[u8], at: usize) -> bool {
    bytes
        .get(at)
        .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'@' | b'#' | b'$') || *b >= 0x80)
}

/// Split on `;` outside literals and comments. Used when tokenization fails.
pub(crate) fn split_on_semicolons(text: &str) -> Vec<Range<usize>> {
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    for_each_code_byte(text, 0..text.len(), |i, byte| {
        if byte == b';' {
            pieces.push(piece_start..i);
            piece_start = i + 1;
        }
        ControlFlow::Continue(())
    });
    pieces.push(piece_start..text.len());
    pieces
        .into_iter()
        .map(|piece| trim_range(text, piece))
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Shrink a range so it starts and ends on non-whitespace bytes.
pub fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let bytes = text.as_bytes();
    let mut start = range.start;
    let mut end = range.end.min(bytes.len());
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    start..end
}

/// A balanced-parenthesis block and its top-level comma-separated rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParenBlock {
    pub open: usize,
    /// `None` when the input ends before the block is closed
    pub close: Option<usize>,
    pub rows: Vec<Range<usize>>,
}

impl ParenBlock {
    pub fn is_closed(&self) -> bool {
        self.close.is_some()
    }
}

/// Scan the block opened at `open`. Unbalanced input yields the rows seen before EOF.
pub fn paren_block(text: &str, open: usize) -> Option<ParenBlock> {
    if text.as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    let close = find_matching_paren(text, open);
    let inner_end = close.unwrap_or(text.len());
    Some(ParenBlock {
        open,
        close,
        rows: split_top_level(text, open + 1..inner_end),
    })
}

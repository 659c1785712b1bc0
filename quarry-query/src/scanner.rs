//! Lexical scanner that separates live SQL from protected spans.
//!
//! The scanner walks SQL text once and classifies every character into one
//! lexical [`Context`]. Characters inside quoted literals, quoted identifiers,
//! comments and dollar-quoted bodies are copied verbatim; only live characters
//! are offered to the caller's callback, which can rewrite them.
//!
//! Unterminated spans are never errors: they extend to the end of the input.
//!
//! ```rust
//! use quarry_query::scanner;
//!
//! // Replace every live `?` with `#`; the one inside the literal is protected.
//! let out = scanner::scan("select '?' , ?", |pos, ch, out| {
//!     if ch == '?' {
//!         out.push('#');
//!         Some(pos + 1)
//!     } else {
//!         None
//!     }
//! });
//! assert_eq!(out, "select '?' , #");
//! ```

use std::ops::Range;

/// The lexical context a character belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    /// Plain SQL.
    Live,
    /// `-- ...` through end of line.
    LineComment,
    /// `/* ... */`, nestable.
    BlockComment,
    /// `'...'` with `''` escapes.
    SingleQuoted,
    /// `"..."` with `""` escapes.
    DoubleQuoted,
    /// `` `...` `` without escapes.
    Backtick,
    /// `$tag$ ... $tag$` or `$$ ... $$`.
    DollarQuoted,
}

impl Context {
    /// Whether placeholders and statement separators are inert in this context.
    pub fn is_protected(&self) -> bool {
        !matches!(self, Self::Live)
    }
}

/// A classified region of SQL text, in byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Lexical context of the region.
    pub context: Context,
    /// Byte range within the scanned text.
    pub range: Range<usize>,
}

/// If a protected span opens at `pos`, return its context and exclusive end.
///
/// All delimiters are ASCII, so byte-wise matching never lands inside a
/// multi-byte character.
fn protected_span(bytes: &[u8], pos: usize) -> Option<(Context, usize)> {
    let len = bytes.len();
    let next = bytes.get(pos + 1).copied();

    match bytes[pos] {
        b'-' if next == Some(b'-') => {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(len, |offset| pos + offset);
            Some((Context::LineComment, end))
        }
        b'/' if next == Some(b'*') => {
            let mut depth = 1usize;
            let mut i = pos + 2;
            while i < len {
                if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                    depth += 1;
                    i += 2;
                } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        return Some((Context::BlockComment, i));
                    }
                } else {
                    i += 1;
                }
            }
            Some((Context::BlockComment, len))
        }
        b'\'' => Some((Context::SingleQuoted, quoted_end(bytes, pos, b'\'', true))),
        b'"' => Some((Context::DoubleQuoted, quoted_end(bytes, pos, b'"', true))),
        b'`' => Some((Context::Backtick, quoted_end(bytes, pos, b'`', false))),
        b'$' => {
            let tag_len = dollar_tag_len(bytes, pos)?;
            let tag = &bytes[pos..pos + tag_len];
            let body_start = pos + tag_len;
            let end = bytes[body_start..]
                .windows(tag_len)
                .position(|window| window == tag)
                .map_or(len, |offset| body_start + offset + tag_len);
            Some((Context::DollarQuoted, end))
        }
        _ => None,
    }
}

/// Exclusive end of a quoted span opened at `pos`.
fn quoted_end(bytes: &[u8], pos: usize, quote: u8, doubled_escape: bool) -> usize {
    let mut i = pos + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if doubled_escape && bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Length of a dollar-quote tag (`$$` or `$ident$`) starting at `pos`.
///
/// A `$` followed by a digit never opens a tag, so `$1` stays a placeholder.
pub(crate) fn dollar_tag_len(bytes: &[u8], pos: usize) -> Option<usize> {
    if bytes.get(pos) != Some(&b'$') {
        return None;
    }
    match bytes.get(pos + 1) {
        Some(b'$') => Some(2),
        Some(&first) if first.is_ascii_alphabetic() || first == b'_' => {
            let mut i = pos + 2;
            while let Some(&b) = bytes.get(i) {
                if b == b'$' {
                    return Some(i + 1 - pos);
                }
                if !(b.is_ascii_alphanumeric() || b == b'_') {
                    return None;
                }
                i += 1;
            }
            None
        }
        _ => None,
    }
}

fn scan_impl<F>(sql: &str, write: bool, mut callback: F) -> String
where
    F: FnMut(usize, char, &mut String) -> Option<usize>,
{
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(if write { sql.len() } else { 0 });
    let mut scratch = String::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if let Some((_, end)) = protected_span(bytes, pos) {
            if write {
                out.push_str(&sql[pos..end]);
            }
            pos = end;
            continue;
        }

        // `pos` always sits on a char boundary: spans end on ASCII delimiters
        // and callbacks are required to return boundaries.
        let Some(ch) = sql[pos..].chars().next() else {
            break;
        };
        let buffer = if write { &mut out } else { &mut scratch };
        match callback(pos, ch, buffer) {
            Some(next) => {
                debug_assert!(next > pos, "scanner callback must make progress");
                debug_assert!(sql.is_char_boundary(next.min(sql.len())));
                pos = next.max(pos + ch.len_utf8()).min(bytes.len());
            }
            None => {
                if write {
                    out.push(ch);
                }
                pos += ch.len_utf8();
            }
        }
        if !write {
            scratch.clear();
        }
    }

    out
}

/// Scan `sql`, invoking `callback` for every live character.
///
/// The callback receives the byte position, the character and the output
/// buffer. Returning `Some(next)` means the callback consumed the text up to
/// (not including) byte `next` and already appended its replacement; returning
/// `None` copies the character unchanged. Protected spans are copied verbatim
/// without invoking the callback.
pub fn scan<F>(sql: &str, callback: F) -> String
where
    F: FnMut(usize, char, &mut String) -> Option<usize>,
{
    scan_impl(sql, true, callback)
}

/// Scan `sql` for callback side effects only, without building output.
///
/// Anything the callback appends is discarded.
pub fn scan_silent<F>(sql: &str, callback: F)
where
    F: FnMut(usize, char, &mut String) -> Option<usize>,
{
    scan_impl(sql, false, callback);
}

/// Classify `sql` into contiguous spans covering the whole input.
pub fn spans(sql: &str) -> Vec<Span> {
    let bytes = sql.as_bytes();
    let mut spans: Vec<Span> = Vec::new();
    let mut live_start: Option<usize> = None;
    let mut pos = 0;

    while pos < bytes.len() {
        if let Some((context, end)) = protected_span(bytes, pos) {
            if let Some(start) = live_start.take() {
                spans.push(Span {
                    context: Context::Live,
                    range: start..pos,
                });
            }
            spans.push(Span {
                context,
                range: pos..end,
            });
            pos = end;
        } else {
            live_start.get_or_insert(pos);
            pos += 1;
        }
    }
    if let Some(start) = live_start {
        spans.push(Span {
            context: Context::Live,
            range: start..bytes.len(),
        });
    }

    spans
}

/// Split a script into statements on live semicolons.
///
/// Each statement is trimmed; chunks with no live SQL besides whitespace
/// (empty or comment-only) are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut cuts = Vec::new();
    scan_silent(sql, |pos, ch, _| {
        if ch == ';' {
            cuts.push(pos);
        }
        None
    });

    let mut statements = Vec::new();
    let mut start = 0;
    for end in cuts.into_iter().chain(std::iter::once(sql.len())) {
        let chunk = &sql[start..end];
        if has_live_content(chunk) {
            statements.push(chunk.trim().to_string());
        }
        start = (end + 1).min(sql.len());
    }

    statements
}

/// Whether `sql` contains any non-whitespace live character or literal.
fn has_live_content(sql: &str) -> bool {
    spans(sql).iter().any(|span| match span.context {
        Context::Live => !sql[span.range.clone()].trim().is_empty(),
        Context::LineComment | Context::BlockComment => false,
        _ => true,
    })
}

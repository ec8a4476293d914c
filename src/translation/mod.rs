use std::borrow::Cow;

use clap::ValueEnum;
use tracing::debug;

use crate::types::RowValues;

mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    try_start_dollar_quote,
};
use scanner::State;

/// The portable parameter marker accepted in query text.
pub const PORTABLE_MARKER: u8 = b'?';

/// How `?` markers are found in query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TranslationMode {
    /// Every `?` is a parameter. There is no escape for a literal `?`.
    #[default]
    Portable,
    /// Leave `?` alone inside quoted strings, quoted identifiers, comments, and
    /// dollar-quoted bodies.
    LiteralAware,
}

/// Rewrite `?` markers into `$1, $2, ...` in order of appearance.
///
/// With `arg_count == 0` the text comes back untouched and is not scanned, even if it
/// contains `?` characters.
///
/// ```rust
/// use pg_access::prelude::*;
///
/// let sql = translate_placeholders("SELECT * FROM t WHERE a = ? AND b = ?", 2, TranslationMode::Portable);
/// assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
/// ```
#[must_use]
pub fn translate_placeholders(sql: &str, arg_count: usize, mode: TranslationMode) -> Cow<'_, str> {
    if arg_count == 0 {
        return Cow::Borrowed(sql);
    }
    scan(sql, mode, true).0
}

/// Number of markers `translate_placeholders` would rewrite, ignoring `arg_count`.
#[must_use]
pub fn count_placeholders(sql: &str, mode: TranslationMode) -> usize {
    scan(sql, mode, false).1
}

fn scan(sql: &str, mode: TranslationMode, rewrite: bool) -> (Cow<'_, str>, usize) {
    let mut out: Option<String> = None;
    let mut state = State::Normal;
    let mut ordinal = 0usize;
    let mut idx = 0;
    let bytes = sql.as_bytes();
    // Only ASCII bytes are ever replaced, so copying unchanged runs by byte range keeps
    // multi-byte characters intact.
    let mut copied_to = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                PORTABLE_MARKER => {
                    ordinal += 1;
                    if rewrite {
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
                        buf.push_str(&sql[copied_to..idx]);
                        buf.push('$');
                        buf.push_str(&ordinal.to_string());
                        copied_to = idx + 1;
                    }
                }
                _ if mode == TranslationMode::Portable => {}
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    let text = match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_to..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    };
    (text, ordinal)
}

/// Query text in the driver's `$N` syntax plus its arguments, built once per call.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    text: String,
    args: Vec<RowValues>,
}

impl PreparedQuery {
    /// Translate `text` and take a copy of `args`.
    ///
    /// Marker and argument counts are not checked against each other; the server reports
    /// a mismatch when the statement runs.
    #[must_use]
    pub fn new(text: &str, args: &[RowValues], mode: TranslationMode) -> Self {
        let translated = translate_placeholders(text, args.len(), mode);
        if !args.is_empty() {
            let markers = count_placeholders(text, mode);
            if markers != args.len() {
                debug!(markers, args = args.len(), "placeholder count differs from argument count");
            }
        }
        Self {
            text: translated.into_owned(),
            args: args.to_vec(),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn args(&self) -> &[RowValues] {
        &self.args
    }
}

//! Positional placeholder scanning and rendering.
//!
//! Accepted forms, recognised only outside string literals, quoted
//! identifiers and comments:
//!
//! - `?` sequential, the i-th `?` refers to value i
//! - `?N` and `$N`, 1-based
//! - `@paramN`, 0-based
//!
//! The statement is re-rendered in the backend's native style and paired with
//! the order in which values must be bound. Values are never spliced into the
//! SQL text.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;

/// Highest accepted placeholder number. PostgreSQL caps bind parameters at 65535.
pub const MAX_PLACEHOLDERS: usize = 65535;

/// SQL ready to hand to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSql {
    pub sql: String,
    /// Value index for each bind slot, in bind order.
    pub bind_order: Vec<usize>,
}

impl PreparedSql {
    pub fn has_params(&self) -> bool {
        !self.bind_order.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Placeholder {
    Sequential,
    Explicit(usize),
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backtick,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Rewrite `sql` for `target` and check it references exactly `value_count`
/// placeholders.
pub fn prepare_sql(sql: &str, value_count: usize, target: DatabaseType) -> DbResult<PreparedSql> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut occurrences: Vec<usize> = Vec::new();
    let mut next_sequential = 0usize;
    let mut saw_sequential = false;
    let mut saw_explicit = false;
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => {
                if let Some((placeholder, end)) = placeholder_at(bytes, idx)? {
                    let index = match placeholder {
                        Placeholder::Sequential => {
                            saw_sequential = true;
                            next_sequential += 1;
                            next_sequential - 1
                        }
                        Placeholder::Explicit(index) => {
                            saw_explicit = true;
                            index
                        }
                    };
                    out.push_str(&sql[copied..idx]);
                    render(&mut out, target, index);
                    occurrences.push(index);
                    copied = end;
                    idx = end;
                    continue;
                }

                match b {
                    b'\'' => state = State::SingleQuoted,
                    b'"' => state = State::DoubleQuoted,
                    b'`' => state = State::Backtick,
                    b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                        state = State::LineComment;
                        idx += 1;
                    }
                    b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                        state = State::BlockComment(1);
                        idx += 1;
                    }
                    b'$' => {
                        if let Some((tag, tag_end)) = dollar_quote_at(bytes, idx) {
                            state = State::DollarQuoted(tag);
                            idx = tag_end;
                        }
                    }
                    _ => {}
                }
            }
            // MySQL also escapes with a backslash inside string literals
            State::SingleQuoted | State::DoubleQuoted
                if b == b'\\' && target == DatabaseType::MySQL =>
            {
                idx += 1;
            }
            State::SingleQuoted => state = close_quote(bytes, &mut idx, b'\'', State::SingleQuoted),
            State::DoubleQuoted => state = close_quote(bytes, &mut idx, b'"', State::DoubleQuoted),
            State::Backtick => state = close_quote(bytes, &mut idx, b'`', State::Backtick),
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }
    out.push_str(&sql[copied..]);

    if saw_sequential && saw_explicit {
        return Err(DbError::invalid_input(
            "Bare '?' placeholders cannot be mixed with numbered placeholders",
        ));
    }

    let expected = occurrences.iter().max().map_or(0, |max| max + 1);
    if (0..expected).any(|i| !occurrences.contains(&i)) {
        let mut referenced = occurrences.clone();
        referenced.sort_unstable();
        referenced.dedup();
        return Err(DbError::parameter_mismatch(referenced.len(), value_count));
    }
    if expected != value_count {
        return Err(DbError::parameter_mismatch(expected, value_count));
    }

    let bind_order = match target {
        // `?` binds strictly by occurrence
        DatabaseType::MySQL => occurrences,
        DatabaseType::PostgreSQL | DatabaseType::SQLite => (0..expected).collect(),
    };

    Ok(PreparedSql {
        sql: out,
        bind_order,
    })
}

fn render(out: &mut String, target: DatabaseType, index: usize) {
    match target {
        DatabaseType::PostgreSQL => {
            out.push('$');
            out.push_str(&(index + 1).to_string());
        }
        DatabaseType::SQLite => {
            out.push('?');
            out.push_str(&(index + 1).to_string());
        }
        DatabaseType::MySQL => out.push('?'),
    }
}

/// Recognise a placeholder starting at `idx`, returning it and the index just past it.
fn placeholder_at(bytes: &[u8], idx: usize) -> DbResult<Option<(Placeholder, usize)>> {
    match bytes[idx] {
        b'?' => match scan_number(bytes, idx + 1)? {
            Some((n, end)) => Ok(Some((Placeholder::Explicit(one_based(n, "?")?), end))),
            None => Ok(Some((Placeholder::Sequential, idx + 1))),
        },
        b'$' => Ok(scan_number(bytes, idx + 1)?
            .map(|(n, end)| one_based(n, "$").map(|i| (Placeholder::Explicit(i), end)))
            .transpose()?),
        b'@' if bytes[idx + 1..].starts_with(b"param") => Ok(scan_number(bytes, idx + 6)?
            .map(|(n, end)| within_limit(n).map(|i| (Placeholder::Explicit(i), end)))
            .transpose()?),
        _ => Ok(None),
    }
}

fn within_limit(index: usize) -> DbResult<usize> {
    if index >= MAX_PLACEHOLDERS {
        return Err(DbError::invalid_input(format!(
            "Placeholder number {} exceeds the limit of {}",
            index, MAX_PLACEHOLDERS
        )));
    }
    Ok(index)
}

fn one_based(n: usize, prefix: &str) -> DbResult<usize> {
    n.checked_sub(1)
        .ok_or_else(|| DbError::invalid_input(format!("Placeholder {}0 is not valid, numbering starts at 1", prefix)))
        .and_then(within_limit)
}

fn scan_number(bytes: &[u8], start: usize) -> DbResult<Option<(usize, usize)>> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return Ok(None);
    }
    let digits = std::str::from_utf8(&bytes[start..end])
        .map_err(|e| DbError::internal(format!("Invalid placeholder digits: {}", e)))?;
    let n = digits
        .parse()
        .map_err(|_| DbError::invalid_input(format!("Placeholder number {} is too large", digits)))?;
    Ok(Some((n, end)))
}

/// Advance past a closing quote, treating a doubled quote as an escape.
fn close_quote(bytes: &[u8], idx: &mut usize, quote: u8, current: State) -> State {
    if bytes[*idx] != quote {
        return current;
    }
    if bytes.get(*idx + 1) == Some(&quote) {
        *idx += 1;
        current
    } else {
        State::Normal
    }
}

/// `$tag$` or `$$` opening a PostgreSQL dollar-quoted string.
fn dollar_quote_at(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    if bytes.get(idx).is_some_and(|b| b.is_ascii_digit()) {
        return None;
    }
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    bytes.len() > end && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}

//! Quote-toggling field splitter.
//!
//! A double quote flips an "inside quotes" flag; the delimiter only ends a
//! field while the flag is clear. Quotes are kept in the field text and
//! `""` is not treated as an escaped quote, so this is deliberately not an
//! RFC 4180 reader. Unbalanced quotes just move the split points.

use crate::error::{LoadError, Result};

pub const QUOTE: char = '"';
/// Byte order mark some editors put at the start of UTF-8 files.
pub const BOM: char = '\u{feff}';

/// Split one line (without its terminator) into fields.
///
/// There is always one more field than effective delimiters, so an empty
/// line yields a single empty field.
pub fn split_fields(line: &str, delimiter: char) -> Vec<&str> {
    split_fields_limited(line, delimiter, usize::MAX)
}

/// Like [`split_fields`], but stops scanning once `limit` fields are collected.
///
/// The remainder of the line after the `limit`-th field is dropped.
pub fn split_fields_limited(line: &str, delimiter: char, limit: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    if limit == 0 {
        return fields;
    }

    let mut in_quotes = false;
    let mut start = 0usize;
    for (idx, ch) in line.char_indices() {
        if ch == QUOTE {
            in_quotes = !in_quotes;
        } else if ch == delimiter && !in_quotes {
            fields.push(&line[start..idx]);
            if fields.len() == limit {
                return fields;
            }
            start = idx + ch.len_utf8();
        }
    }
    fields.push(&line[start..]);
    fields
}

/// Remove a trailing `\n` or `\r\n`.
pub fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Decode one raw record read up to and including its `\n`.
///
/// The terminator is dropped, and on the first record of a file so is a
/// leading byte order mark.
pub fn decode_record(raw: &[u8], first: bool) -> std::result::Result<&str, std::str::Utf8Error> {
    let line = strip_line_terminator(std::str::from_utf8(raw)?);
    if first {
        Ok(line.strip_prefix(BOM).unwrap_or(line))
    } else {
        Ok(line)
    }
}

/// Remove one leading and one trailing quote when both are present.
pub fn strip_outer_quotes(field: &str) -> &str {
    if field.len() >= 2 && field.starts_with(QUOTE) && field.ends_with(QUOTE) {
        &field[1..field.len() - 1]
    } else {
        field
    }
}

/// Parse a user-supplied delimiter (`,`, `|`, `\t`, `tab`, `pipe`, ...).
pub fn parse_delimiter(input: &str) -> Result<char> {
    let delimiter = match input {
        "\\t" | "tab" | "TAB" => '\t',
        "pipe" | "PIPE" => '|',
        "comma" | "COMMA" => ',',
        "semicolon" | "SEMICOLON" => ';',
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => ch,
                _ => {
                    return Err(LoadError::invalid_config(format!(
                        "Delimiter must be a single character, got '{}'",
                        input
                    )))
                }
            }
        }
    };

    if matches!(delimiter, QUOTE | '\r' | '\n') {
        return Err(LoadError::invalid_config(format!(
            "Delimiter {:?} conflicts with quoting or record terminators",
            delimiter
        )));
    }
    Ok(delimiter)
}

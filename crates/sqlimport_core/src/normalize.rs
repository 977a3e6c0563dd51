//! Row repair for legacy exports with missing or extra separators.

use crate::delimited::split_fields_limited;
use std::borrow::Cow;

/// Pad or trim `line` so it carries exactly `target_columns` fields.
///
/// The initial count is a raw delimiter count and is not quote-aware, so a
/// quoted field holding the delimiter can trigger a trim. The trim path
/// re-parses once with the quote-aware splitter and pads if the quoted
/// fields leave it short. `line` must not include its record terminator.
///
/// Applying the function twice is a no-op whenever the line has an even
/// number of quote characters. With an unbalanced quote the open field runs
/// to the end of the line, so each further pass appends more delimiters.
pub fn normalize_line(line: &str, delimiter: char, target_columns: usize) -> Cow<'_, str> {
    if target_columns == 0 {
        return Cow::Borrowed(line);
    }

    let observed = line.matches(delimiter).count() + 1;
    if observed == target_columns {
        return Cow::Borrowed(line);
    }

    if observed < target_columns {
        let missing = target_columns - observed;
        let mut padded = String::with_capacity(line.len() + missing * delimiter.len_utf8());
        padded.push_str(line);
        padded.extend(std::iter::repeat(delimiter).take(missing));
        return Cow::Owned(padded);
    }

    let fields = split_fields_limited(line, delimiter, target_columns);
    let mut rebuilt = String::with_capacity(line.len());
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            rebuilt.push(delimiter);
        }
        rebuilt.push_str(field);
    }
    // quoted delimiters can leave fewer real fields than the raw count implied
    for _ in fields.len()..target_columns {
        rebuilt.push(delimiter);
    }
    Cow::Owned(rebuilt)
}

//! Diagnostic scan for fields wider than their character column.

use crate::delimited::{split_fields, strip_line_terminator, strip_outer_quotes};
use crate::error::Result;
use crate::types::ColumnSpec;
use serde::Serialize;
use std::io::BufRead;
use tracing::info;

const SAMPLE_LIMIT: usize = 50;
const SAMPLE_KEEP: usize = 47;
const PROGRESS_EVERY: u64 = 1000;

/// A field that would be truncated (or rejected) by its target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OversizedField {
    /// 1-based line number in the source file, header included
    pub row_number: u64,
    pub column: String,
    pub data_length: usize,
    pub max_allowed: u32,
    /// Field text, shortened for display
    pub sample: String,
}

/// Scan `reader` and report every oversized field, mapping fields to
/// `columns` by position. Only bounded character columns are checked.
pub fn scan_oversized_fields<R: BufRead>(
    reader: R,
    columns: &[ColumnSpec],
    delimiter: char,
    has_header: bool,
) -> Result<Vec<OversizedField>> {
    let mut problems = Vec::new();
    let mut row_number = 0u64;

    for line in reader.lines() {
        let line = line?;
        row_number += 1;
        if has_header && row_number == 1 {
            continue;
        }

        let fields = split_fields(strip_line_terminator(&line), delimiter);
        for (field, column) in fields.iter().zip(columns) {
            let Some(max_allowed) = column.max_length.bound() else {
                continue;
            };
            if !column.sql_type.is_character() {
                continue;
            }
            let value = strip_outer_quotes(field);
            let data_length = value.chars().count();
            if data_length > max_allowed as usize {
                problems.push(OversizedField {
                    row_number,
                    column: column.name.clone(),
                    data_length,
                    max_allowed,
                    sample: display_sample(value, data_length),
                });
            }
        }

        if row_number % PROGRESS_EVERY == 0 {
            info!("Scanned {} rows...", row_number);
        }
    }

    Ok(problems)
}

fn display_sample(value: &str, char_len: usize) -> String {
    if char_len > SAMPLE_LIMIT {
        let mut sample: String = value.chars().take(SAMPLE_KEEP).collect();
        sample.push_str("...");
        sample
    } else {
        value.to_string()
    }
}

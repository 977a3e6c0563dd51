//! Preprocessing of a source file into a staged copy for server-side loads.
//!
//! The engine's bulk loader reads records terminated by CRLF with exactly
//! one field per descriptor entry. A staged copy is written when the source
//! does not already look like that: it carries a header row or a byte order
//! mark, its fields must be reordered to table order, it has rows of the
//! wrong width, blank lines, invalid UTF-8 or any LF-only line ending.
//! Otherwise the source is used in place.

use sqlimport_core::{
    decode_record, normalize_line, split_fields, strip_line_terminator, LoadError,
    Reconciliation, Result, BOM, RECORD_TERMINATOR,
};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{info, warn};

/// How source lines become staged lines.
#[derive(Debug, Clone)]
pub struct StagingPlan {
    pub delimiter: char,
    pub skip_header: bool,
    /// Rewrite every line into target column order
    pub reorder: bool,
    pub repair_rows: bool,
    pub target_columns: usize,
    pub progress_every: u64,
}

impl StagingPlan {
    pub fn new(reconciliation: &Reconciliation, delimiter: char, repair_rows: bool) -> Self {
        Self {
            delimiter,
            skip_header: reconciliation.mode().has_header_row(),
            reorder: !reconciliation.is_identity(),
            repair_rows,
            target_columns: reconciliation.targets().len(),
            progress_every: crate::config::DEFAULT_PROGRESS_EVERY,
        }
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every.max(1);
        self
    }
}

/// Read and split the first line of `path`.
pub fn read_header(path: &Path, delimiter: char) -> Result<Option<Vec<String>>> {
    let file = File::open(path).map_err(|e| LoadError::source_not_found(path, e))?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let line = strip_line_terminator(line.trim_start_matches(BOM));
    Ok(Some(
        split_fields(line, delimiter)
            .into_iter()
            .map(String::from)
            .collect(),
    ))
}

/// Whether `source` has to be rewritten before the engine can load it.
///
/// Every record is checked, since a file can switch line endings part way.
pub fn needs_staging(source: &Path, plan: &StagingPlan) -> Result<bool> {
    if plan.skip_header || plan.reorder {
        return Ok(true);
    }
    let file = File::open(source).map_err(|e| LoadError::source_not_found(source, e))?;
    let mut reader = BufReader::new(file);
    let mut raw = Vec::new();
    let mut first = true;
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            return Ok(false);
        }
        // A final record without any terminator is fine.
        if raw.ends_with(b"\n") && !raw.ends_with(b"\r\n") {
            return Ok(true);
        }
        let Ok(line) = decode_record(&raw, false) else {
            return Ok(true);
        };
        if line.is_empty() || (first && line.starts_with(BOM)) {
            return Ok(true);
        }
        if plan.repair_rows {
            if let Cow::Owned(_) = normalize_line(line, plan.delimiter, plan.target_columns) {
                return Ok(true);
            }
        }
        first = false;
    }
}

/// Line counts of one preprocessing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preprocessed {
    pub written: u64,
    /// Lines dropped because they are not valid UTF-8
    pub rejected: u64,
}

/// Rewrite `reader` into `writer` per `plan`.
pub fn preprocess<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    plan: &StagingPlan,
    reconciliation: &Reconciliation,
) -> Result<Preprocessed> {
    let mut outcome = Preprocessed::default();
    let delimiter = plan.delimiter.to_string();
    let mut raw = Vec::new();
    let mut line_number = 0u64;

    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        line_number += 1;
        if line_number == 1 && plan.skip_header {
            continue;
        }
        let line = match decode_record(&raw, line_number == 1) {
            Ok(line) => line,
            Err(err) => {
                warn!("Skipping line {}: not valid UTF-8 ({})", line_number, err);
                outcome.rejected += 1;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        if plan.reorder {
            let fields = split_fields(line, plan.delimiter);
            let projected: Vec<&str> = reconciliation
                .project(&fields)
                .into_iter()
                .map(|field| field.unwrap_or(""))
                .collect();
            writer.write_all(projected.join(&delimiter).as_bytes())?;
        } else if plan.repair_rows {
            let repaired = normalize_line(line, plan.delimiter, plan.target_columns);
            writer.write_all(repaired.as_bytes())?;
        } else {
            writer.write_all(line.as_bytes())?;
        }
        writer.write_all(RECORD_TERMINATOR.as_bytes())?;

        outcome.written += 1;
        if outcome.written % plan.progress_every == 0 {
            info!("Preprocessed {} lines...", outcome.written);
        }
    }

    writer.flush()?;
    Ok(outcome)
}

/// Write the staged copy of `source` into `work_dir` on a blocking thread.
///
/// The returned path deletes the file when dropped.
pub async fn stage_source(
    source: PathBuf,
    work_dir: PathBuf,
    plan: StagingPlan,
    reconciliation: Reconciliation,
) -> Result<(TempPath, Preprocessed)> {
    tokio::task::spawn_blocking(move || {
        let input = File::open(&source).map_err(|e| LoadError::source_not_found(&source, e))?;
        let staged = tempfile::Builder::new()
            .prefix("sqlimport_")
            .suffix(".csv")
            .tempfile_in(&work_dir)?;
        let (file, path) = staged.into_parts();
        let outcome = preprocess(
            BufReader::new(input),
            BufWriter::new(file),
            &plan,
            &reconciliation,
        )?;
        info!(
            "Staged {} lines from {} into {}",
            outcome.written,
            source.display(),
            path.display()
        );
        Ok((path, outcome))
    })
    .await
    .map_err(|e| LoadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

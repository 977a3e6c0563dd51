//! Row-streaming strategy: parse, convert and bulk-copy rows in batches.

use crate::catalog::{BulkCopy, BulkCopyOptions};
use crate::progress::ProgressReporter;
use sqlimport_core::{
    convert_field, decode_record, split_fields, LoadError, QuotePolicy, Reconciliation, Result,
    SqlValue, TableName,
};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Row-level settings for one streaming load.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub delimiter: char,
    pub skip_header: bool,
    /// 0 sends every row in a single batch
    pub batch_size: usize,
    pub keep_nulls: bool,
    pub quote_policy: QuotePolicy,
    pub bulk: BulkCopyOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    pub rows_written: u64,
    pub rows_rejected: u64,
    pub batches: u64,
}

/// Convert one source line into a row in target-column order.
pub fn build_row(
    line: &str,
    reconciliation: &Reconciliation,
    settings: &StreamSettings,
) -> std::result::Result<Vec<SqlValue>, sqlimport_core::ValueError> {
    let fields = split_fields(line, settings.delimiter);
    reconciliation
        .project(&fields)
        .into_iter()
        .zip(reconciliation.targets())
        .map(|(field, column)| match field {
            Some(raw) => convert_field(settings.quote_policy.apply(raw), column, settings.keep_nulls),
            None => Ok(SqlValue::Null),
        })
        .collect()
}

/// Stream `source` into `table` through `bulk`.
///
/// Rows that are not valid UTF-8 or fail conversion are logged and skipped.
/// A failed batch or read aborts the load; rows committed by earlier batches
/// are reported in the error.
pub async fn stream_rows<B: BulkCopy + ?Sized>(
    bulk: &mut B,
    table: &TableName,
    source: &Path,
    reconciliation: &Reconciliation,
    settings: &StreamSettings,
    progress: &mut ProgressReporter,
) -> Result<StreamOutcome> {
    let file = File::open(source)
        .await
        .map_err(|e| LoadError::source_not_found(source, e))?;
    let mut reader = BufReader::new(file);
    let mut raw = Vec::new();

    let capacity = if settings.batch_size == 0 {
        1024
    } else {
        settings.batch_size
    };
    let mut batch: Vec<Vec<SqlValue>> = Vec::with_capacity(capacity);
    let mut outcome = StreamOutcome::default();
    let mut line_number = 0u64;
    let mut rows_read = 0u64;

    loop {
        raw.clear();
        let read = reader.read_until(b'\n', &mut raw).await.map_err(|e| {
            LoadError::execution(
                format!("Reading {} failed after line {}", source.display(), line_number),
                outcome.rows_written,
                Some(Box::new(e)),
            )
        })?;
        if read == 0 {
            break;
        }
        line_number += 1;
        if line_number == 1 && settings.skip_header {
            continue;
        }
        let line = match decode_record(&raw, line_number == 1) {
            Ok(line) => line,
            Err(err) => {
                warn!("Skipping line {}: not valid UTF-8 ({})", line_number, err);
                rows_read += 1;
                outcome.rows_rejected += 1;
                progress.rows_read(rows_read);
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        rows_read += 1;
        match build_row(line, reconciliation, settings) {
            Ok(row) => batch.push(row),
            Err(err) => {
                warn!("Skipping line {}: {}", line_number, err);
                outcome.rows_rejected += 1;
            }
        }
        progress.rows_read(rows_read);

        if settings.batch_size > 0 && batch.len() >= settings.batch_size {
            flush(bulk, table, reconciliation, settings, &mut batch, &mut outcome, progress).await?;
        }
    }

    if !batch.is_empty() {
        flush(bulk, table, reconciliation, settings, &mut batch, &mut outcome, progress).await?;
    }

    debug!(
        "Streamed {} rows in {} batches ({} rejected)",
        outcome.rows_written, outcome.batches, outcome.rows_rejected
    );
    Ok(outcome)
}

async fn flush<B: BulkCopy + ?Sized>(
    bulk: &mut B,
    table: &TableName,
    reconciliation: &Reconciliation,
    settings: &StreamSettings,
    batch: &mut Vec<Vec<SqlValue>>,
    outcome: &mut StreamOutcome,
    progress: &ProgressReporter,
) -> Result<()> {
    let rows = std::mem::take(batch);
    let sent = rows.len();
    let written = bulk
        .write_batch(table, reconciliation.targets(), rows, &settings.bulk)
        .await
        .map_err(|e| {
            LoadError::execution(
                format!("Bulk copy of batch {} ({} rows) failed", outcome.batches + 1, sent),
                outcome.rows_written,
                Some(Box::new(e)),
            )
        })?;
    outcome.rows_written += written;
    outcome.batches += 1;
    progress.batch_committed(written, outcome.rows_written);
    Ok(())
}

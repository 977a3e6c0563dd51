//! `scan-lengths`: report fields too wide for their column, without loading.

use crate::catalog::Database;
use sqlimport_core::{scan_oversized_fields, LoadError, OversizedField, Result, TableName};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

/// Scan `source` against the declared widths of `table`'s columns.
pub async fn scan_field_lengths<D: Database + ?Sized>(
    db: &mut D,
    table: &TableName,
    source: PathBuf,
    delimiter: char,
    has_header: bool,
) -> Result<Vec<OversizedField>> {
    let columns = db.table_columns(table).await?;
    if columns.is_empty() {
        return Err(LoadError::table_not_found(table.to_string()));
    }
    info!("Scanning {} against {}", source.display(), table);

    let problems = tokio::task::spawn_blocking(move || {
        let file = File::open(&source).map_err(|e| LoadError::source_not_found(&source, e))?;
        scan_oversized_fields(BufReader::new(file), &columns, delimiter, has_header)
    })
    .await
    .map_err(|e| LoadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    info!("Found {} oversized fields", problems.len());
    Ok(problems)
}

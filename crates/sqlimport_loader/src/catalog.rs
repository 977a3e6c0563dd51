//! External database capabilities the orchestrator drives.
//!
//! Implemented for SQL Server by `sqlimport_mssql` and by the in-memory
//! fake in `sqlimport_test_utils`.

use async_trait::async_trait;
use sqlimport_core::{ColumnSpec, LoadError, Result, SqlValue, TableName};
use std::time::Duration;

/// Statement execution and schema catalog access.
#[async_trait]
pub trait Database: Send {
    /// Execute a statement, returning the rows affected.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Execute a statement and return the first column of the first row.
    async fn execute_scalar(&mut self, sql: &str) -> Result<Option<i64>>;

    /// Columns of `table` in ordinal order; empty when the table does not exist.
    async fn table_columns(&mut self, table: &TableName) -> Result<Vec<ColumnSpec>>;

    /// Execute a long-running statement with a deadline.
    async fn execute_with_timeout(&mut self, sql: &str, timeout: Duration) -> Result<u64> {
        match tokio::time::timeout(timeout, self.execute(sql)).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::database(format!(
                "Statement timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

/// Hints forwarded to the bulk-copy transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkCopyOptions {
    pub table_lock: bool,
    pub check_constraints: bool,
    pub keep_nulls: bool,
    pub keep_identity: bool,
    pub timeout: Duration,
}

/// Row-streaming bulk copy of typed rows.
#[async_trait]
pub trait BulkCopy: Send {
    /// Send one batch. `rows` are in `columns` order, one value per column.
    /// Returns the number of rows the server committed.
    async fn write_batch(
        &mut self,
        table: &TableName,
        columns: &[ColumnSpec],
        rows: Vec<Vec<SqlValue>>,
        options: &BulkCopyOptions,
    ) -> Result<u64>;
}

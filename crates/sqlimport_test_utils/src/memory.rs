//! In-memory stand-in for SQL Server.

use async_trait::async_trait;
use sqlimport_core::{ColumnSpec, LoadError, Result, SqlValue, TableName};
use sqlimport_loader::{BulkCopy, BulkCopyOptions, Database};
use std::collections::HashMap;
use tracing::debug;

/// A `BULK INSERT` seen by the fake, with the files it referenced.
///
/// File contents are captured at execution time because the loader deletes
/// them during cleanup.
#[derive(Debug, Clone)]
pub struct BulkInsertRecord {
    pub sql: String,
    pub data_path: String,
    pub format_path: String,
    pub data: Option<String>,
    pub format: Option<String>,
}

impl BulkInsertRecord {
    /// CRLF-terminated records in the captured data file.
    pub fn records(&self) -> Vec<&str> {
        self.data
            .as_deref()
            .map(|d| d.split_terminator("\r\n").collect())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct MemoryTable {
    name: TableName,
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<SqlValue>>,
}

/// Records every statement and row; fails on demand.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: HashMap<String, MemoryTable>,
    statements: Vec<String>,
    batches: Vec<usize>,
    bulk_inserts: Vec<BulkInsertRecord>,
    fail_patterns: Vec<String>,
    fail_batch: Option<usize>,
    fail_catalog: bool,
}

fn key(table: &TableName) -> String {
    format!(
        "{}.{}",
        table.schema.as_deref().unwrap_or("dbo"),
        table.name
    )
    .to_lowercase()
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, table: TableName, columns: Vec<ColumnSpec>) {
        self.tables.insert(
            key(&table),
            MemoryTable {
                name: table,
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Seed rows, e.g. to observe a truncate.
    pub fn insert_rows(&mut self, table: &TableName, rows: Vec<Vec<SqlValue>>) {
        if let Some(t) = self.tables.get_mut(&key(table)) {
            t.rows.extend(rows);
        }
    }

    /// Any statement containing `pattern` fails with a database error.
    pub fn fail_statements_containing(&mut self, pattern: impl Into<String>) {
        self.fail_patterns.push(pattern.into());
    }

    /// The `n`th bulk-copy batch (1-based) fails.
    pub fn fail_bulk_copy_batch(&mut self, n: usize) {
        self.fail_batch = Some(n);
    }

    pub fn fail_catalog(&mut self) {
        self.fail_catalog = true;
    }

    pub fn rows(&self, table: &TableName) -> &[Vec<SqlValue>] {
        self.tables
            .get(&key(table))
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Whether any executed statement contains `needle`.
    pub fn executed(&self, needle: &str) -> bool {
        self.statements.iter().any(|s| s.contains(needle))
    }

    /// Row counts of every bulk-copy batch received.
    pub fn batches(&self) -> &[usize] {
        &self.batches
    }

    pub fn bulk_inserts(&self) -> &[BulkInsertRecord] {
        &self.bulk_inserts
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        match self.fail_patterns.iter().find(|p| sql.contains(p.as_str())) {
            Some(pattern) => Err(LoadError::database(format!(
                "injected failure for statement matching '{}'",
                pattern
            ))),
            None => Ok(()),
        }
    }

    fn truncate_matching(&mut self, sql: &str) -> u64 {
        let mut cleared = 0;
        for table in self.tables.values_mut() {
            if sql.contains(&format!("TRUNCATE TABLE {}", table.name.quoted())) {
                cleared += table.rows.len() as u64;
                table.rows.clear();
            }
        }
        cleared
    }

    fn run_bulk_insert(&mut self, sql: &str) -> u64 {
        let data_path = quoted_after(sql, "FROM '").unwrap_or_default();
        let format_path = quoted_after(sql, "FORMATFILE = '").unwrap_or_default();
        let record = BulkInsertRecord {
            sql: sql.to_string(),
            data: std::fs::read_to_string(&data_path).ok(),
            format: std::fs::read_to_string(&format_path).ok(),
            data_path,
            format_path,
        };
        let loaded = record.records().len() as u64;

        // Rows land as text; the fake does not interpret the format file.
        let target = self
            .tables
            .values_mut()
            .find(|t| sql.starts_with(&format!("BULK INSERT {}\n", t.name.quoted())));
        if let Some(table) = target {
            for line in record.records() {
                table
                    .rows
                    .push(vec![SqlValue::Text(line.to_string())]);
            }
        }
        self.bulk_inserts.push(record);
        loaded
    }
}

/// Text of the single-quoted literal that follows `marker`.
fn quoted_after(sql: &str, marker: &str) -> Option<String> {
    let start = sql.find(marker)? + marker.len();
    let rest = &sql[start..];
    let mut out = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                out.push('\'');
                continue;
            }
            return Some(out);
        }
        out.push(ch);
    }
    None
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        debug!("memory db execute: {}", sql);
        self.statements.push(sql.to_string());
        self.check_failure(sql)?;

        if sql.starts_with("BULK INSERT") {
            return Ok(self.run_bulk_insert(sql));
        }
        if sql.contains("TRUNCATE TABLE") {
            return Ok(self.truncate_matching(sql));
        }
        Ok(0)
    }

    async fn execute_scalar(&mut self, sql: &str) -> Result<Option<i64>> {
        self.statements.push(sql.to_string());
        self.check_failure(sql)?;
        Ok(None)
    }

    async fn table_columns(&mut self, table: &TableName) -> Result<Vec<ColumnSpec>> {
        if self.fail_catalog {
            return Err(LoadError::database("injected catalog failure"));
        }
        Ok(self
            .tables
            .get(&key(table))
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl BulkCopy for MemoryDatabase {
    async fn write_batch(
        &mut self,
        table: &TableName,
        columns: &[ColumnSpec],
        rows: Vec<Vec<SqlValue>>,
        _options: &BulkCopyOptions,
    ) -> Result<u64> {
        let batch_number = self.batches.len() + 1;
        self.batches.push(rows.len());
        if self.fail_batch == Some(batch_number) {
            return Err(LoadError::database(format!(
                "injected failure on bulk-copy batch {}",
                batch_number
            )));
        }

        let stored = self
            .tables
            .get_mut(&key(table))
            .ok_or_else(|| LoadError::table_not_found(table.to_string()))?;
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(LoadError::database(format!(
                "row has {} values for {} columns",
                bad.len(),
                columns.len()
            )));
        }
        let count = rows.len() as u64;
        stored.rows.extend(rows);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_after_unescapes() {
        let sql = "BULK INSERT [t]\nFROM '/tmp/o''k.csv'\nWITH (FORMATFILE = '/tmp/f.xml')";
        assert_eq!(quoted_after(sql, "FROM '").unwrap(), "/tmp/o'k.csv");
        assert_eq!(quoted_after(sql, "FORMATFILE = '").unwrap(), "/tmp/f.xml");
        assert!(quoted_after(sql, "MISSING '").is_none());
    }

    #[tokio::test]
    async fn test_truncate_clears_rows() {
        let table = TableName::with_schema("dbo", "t");
        let mut db = MemoryDatabase::new();
        db.create_table(table.clone(), Vec::new());
        db.insert_rows(&table, vec![vec![SqlValue::Int(1)]]);
        let cleared = db
            .execute("IF OBJECT_ID(N'[dbo].[t]', N'U') IS NOT NULL TRUNCATE TABLE [dbo].[t]")
            .await
            .unwrap();
        assert_eq!(cleared, 1);
        assert!(db.rows(&table).is_empty());
    }

    #[tokio::test]
    async fn test_injected_statement_failure() {
        let mut db = MemoryDatabase::new();
        db.fail_statements_containing("NOCHECK");
        assert!(db.execute("ALTER TABLE [t] NOCHECK CONSTRAINT ALL").await.is_err());
        assert!(db.execute("SELECT 1").await.is_ok());
        assert_eq!(db.statements().len(), 2);
    }
}

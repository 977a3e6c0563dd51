//! T-SQL text for the load and its surrounding schema maintenance.

use sqlimport_core::TableName;
use std::fmt::Write;

pub const SET_ARITHABORT: &str = "SET ARITHABORT ON";

/// Truncate `table` if it exists; a missing table is reported by the catalog check.
pub fn truncate(table: &TableName) -> String {
    let quoted = table.quoted();
    format!(
        "IF OBJECT_ID({}, N'U') IS NOT NULL TRUNCATE TABLE {}",
        sql_literal(&quoted),
        quoted
    )
}

pub fn disable_constraints(table: &TableName) -> String {
    format!("ALTER TABLE {} NOCHECK CONSTRAINT ALL", table.quoted())
}

pub fn enable_constraints(table: &TableName) -> String {
    format!("ALTER TABLE {} CHECK CONSTRAINT ALL", table.quoted())
}

/// Disable nonclustered indexes only.
///
/// Disabling the clustered index would make the table unreadable and
/// reject the load itself.
pub fn disable_indexes(table: &TableName) -> String {
    let quoted = table.quoted();
    format!(
        "DECLARE @sql NVARCHAR(MAX) = N'';\n\
         SELECT @sql = @sql + N'ALTER INDEX ' + QUOTENAME(i.name) + N' ON {target} DISABLE;'\n\
         FROM sys.indexes AS i\n\
         WHERE i.object_id = OBJECT_ID({object}) AND i.type_desc = 'NONCLUSTERED' AND i.is_disabled = 0;\n\
         EXEC sp_executesql @sql;",
        target = quoted.replace('\'', "''"),
        object = sql_literal(&quoted),
    )
}

/// Rebuilding every index also re-enables the disabled ones.
pub fn rebuild_indexes(table: &TableName) -> String {
    format!("ALTER INDEX ALL ON {} REBUILD", table.quoted())
}

/// Quote `value` as an N'' string literal.
pub fn sql_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Server-side `BULK INSERT` of a staged file through a format file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkInsertStatement {
    pub table: TableName,
    /// Data file path as the engine sees it
    pub data_path: String,
    /// Format file path as the engine sees it
    pub format_path: String,
    pub table_lock: bool,
    pub keep_nulls: bool,
    pub utf8: bool,
    pub check_constraints: bool,
    pub keep_identity: bool,
}

impl BulkInsertStatement {
    pub fn render(&self) -> String {
        let mut options = vec![
            format!("FORMATFILE = {}", plain_literal(&self.format_path)),
            "FIRSTROW = 1".to_string(),
        ];
        if self.table_lock {
            options.push("TABLOCK".to_string());
        }
        options.push("MAXERRORS = 0".to_string());
        if self.keep_nulls {
            options.push("KEEPNULLS".to_string());
        }
        if self.utf8 {
            options.push("CODEPAGE = '65001'".to_string());
        }
        if self.check_constraints {
            options.push("CHECK_CONSTRAINTS".to_string());
        }
        if self.keep_identity {
            options.push("KEEPIDENTITY".to_string());
        }

        let mut sql = String::new();
        let _ = writeln!(sql, "BULK INSERT {}", self.table.quoted());
        let _ = writeln!(sql, "FROM {}", plain_literal(&self.data_path));
        let _ = writeln!(sql, "WITH (");
        let last = options.len() - 1;
        for (idx, option) in options.iter().enumerate() {
            let sep = if idx == last { "" } else { "," };
            let _ = writeln!(sql, "    {}{}", option, sep);
        }
        sql.push(')');
        sql
    }
}

// BULK INSERT takes plain string literals for its paths, not N''.
fn plain_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement() -> BulkInsertStatement {
        BulkInsertStatement {
            table: TableName::with_schema("dbo", "Orders"),
            data_path: r"\\files\stage\orders.csv".to_string(),
            format_path: r"\\files\stage\orders.xml".to_string(),
            table_lock: true,
            keep_nulls: false,
            utf8: false,
            check_constraints: false,
            keep_identity: false,
        }
    }

    #[test]
    fn test_minimal_bulk_insert() {
        let expected = "BULK INSERT [dbo].[Orders]\n\
                        FROM '\\\\files\\stage\\orders.csv'\n\
                        WITH (\n    FORMATFILE = '\\\\files\\stage\\orders.xml',\n    FIRSTROW = 1,\n    TABLOCK,\n    MAXERRORS = 0\n)";
        assert_eq!(statement().render(), expected);
    }

    #[test]
    fn test_optional_hints() {
        let stmt = BulkInsertStatement {
            table_lock: false,
            keep_nulls: true,
            utf8: true,
            check_constraints: true,
            keep_identity: true,
            ..statement()
        };
        let sql = stmt.render();
        assert!(!sql.contains("TABLOCK"));
        assert!(sql.contains("KEEPNULLS,"));
        assert!(sql.contains("CODEPAGE = '65001',"));
        assert!(sql.contains("CHECK_CONSTRAINTS,"));
        assert!(sql.trim_end_matches(')').trim_end().ends_with("KEEPIDENTITY"));
    }

    #[test]
    fn test_paths_are_escaped() {
        let stmt = BulkInsertStatement {
            data_path: "/tmp/o'brien.csv".to_string(),
            ..statement()
        };
        assert!(stmt.render().contains("FROM '/tmp/o''brien.csv'"));
    }

    #[test]
    fn test_maintenance_statements() {
        let table = TableName::new("t");
        assert_eq!(
            truncate(&table),
            "IF OBJECT_ID(N'[t]', N'U') IS NOT NULL TRUNCATE TABLE [t]"
        );
        assert_eq!(disable_constraints(&table), "ALTER TABLE [t] NOCHECK CONSTRAINT ALL");
        assert_eq!(enable_constraints(&table), "ALTER TABLE [t] CHECK CONSTRAINT ALL");
        assert_eq!(rebuild_indexes(&table), "ALTER INDEX ALL ON [t] REBUILD");
        let disable = disable_indexes(&table);
        assert!(disable.contains("NONCLUSTERED"));
        assert!(disable.contains("OBJECT_ID(N'[t]')"));
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal("it's"), "N'it''s'");
    }
}

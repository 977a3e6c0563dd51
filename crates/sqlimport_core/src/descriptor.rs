//! Bulk-load format file (XML) describing field terminators and column types.
//!
//! Output layout:
//!
//! ```text
//! <?xml version="1.0" ?>
//! <BCPFORMAT xmlns="http://schemas.microsoft.com/sqlserver/2004/bulkload/format" xmlns:xsi="...">
//!   <RECORD>
//!     <FIELD ID="1" xsi:type="CharTerm" TERMINATOR="," MAX_LENGTH="8000"/>
//!     <FIELD ID="2" xsi:type="CharTerm" TERMINATOR="\r\n" MAX_LENGTH="8000"/>
//!   </RECORD>
//!   <ROW>
//!     <COLUMN SOURCE="1" NAME="id" xsi:type="SQLINT"/>
//!     <COLUMN SOURCE="2" NAME="name" xsi:type="SQLVARYCHAR"/>
//!   </ROW>
//! </BCPFORMAT>
//! ```

use crate::error::{LoadError, Result};
use crate::types::{ColumnSpec, SqlType};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Field width written for every field. Larger than any declared width the
/// engine accepts for character data, so the engine never truncates on read.
pub const MAX_FIELD_LENGTH: u32 = 8000;

/// Terminator of the last field of every record.
pub const RECORD_TERMINATOR: &str = "\r\n";

pub const BULKLOAD_NAMESPACE: &str = "http://schemas.microsoft.com/sqlserver/2004/bulkload/format";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Tag emitted for SMALLDATETIME columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmallDateTimeTag {
    /// `SQLSMALLDDATETIME`, byte-compatible with format files produced by
    /// earlier tooling.
    #[default]
    Legacy,
    /// `SQLDATETIM4`, the engine's own tag for smalldatetime.
    Corrected,
}

/// Load-format type tag for a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    SqlInt,
    SqlBigInt,
    SqlSmallInt,
    SqlTinyInt,
    SqlBit,
    SqlDecimal,
    SqlNumeric,
    SqlMoney,
    SqlSmallMoney,
    SqlFlt8,
    SqlFlt4,
    SqlDateTime,
    SqlDate,
    SqlTime,
    SqlDateTimeOffset,
    SqlSmallDateTime,
    SqlVaryChar,
}

impl FieldType {
    pub fn for_sql_type(sql_type: SqlType) -> Self {
        match sql_type {
            SqlType::Int => FieldType::SqlInt,
            SqlType::BigInt => FieldType::SqlBigInt,
            SqlType::SmallInt => FieldType::SqlSmallInt,
            SqlType::TinyInt => FieldType::SqlTinyInt,
            SqlType::Bit => FieldType::SqlBit,
            SqlType::Decimal => FieldType::SqlDecimal,
            SqlType::Numeric => FieldType::SqlNumeric,
            SqlType::Money => FieldType::SqlMoney,
            SqlType::SmallMoney => FieldType::SqlSmallMoney,
            SqlType::Float => FieldType::SqlFlt8,
            SqlType::Real => FieldType::SqlFlt4,
            SqlType::DateTime | SqlType::DateTime2 => FieldType::SqlDateTime,
            SqlType::Date => FieldType::SqlDate,
            SqlType::Time => FieldType::SqlTime,
            SqlType::DateTimeOffset => FieldType::SqlDateTimeOffset,
            SqlType::SmallDateTime => FieldType::SqlSmallDateTime,
            SqlType::Character | SqlType::Other => FieldType::SqlVaryChar,
        }
    }

    /// Classify a catalog type name (case-insensitive). Unknown names fall
    /// back to [`FieldType::SqlVaryChar`].
    pub fn from_type_name(name: &str) -> Self {
        Self::for_sql_type(SqlType::from_name(name))
    }

    pub fn tag(&self, small_datetime: SmallDateTimeTag) -> &'static str {
        match self {
            FieldType::SqlInt => "SQLINT",
            FieldType::SqlBigInt => "SQLBIGINT",
            FieldType::SqlSmallInt => "SQLSMALLINT",
            FieldType::SqlTinyInt => "SQLTINYINT",
            FieldType::SqlBit => "SQLBIT",
            FieldType::SqlDecimal => "SQLDECIMAL",
            FieldType::SqlNumeric => "SQLNUMERIC",
            FieldType::SqlMoney => "SQLMONEY",
            FieldType::SqlSmallMoney => "SQLSMALLMONEY",
            FieldType::SqlFlt8 => "SQLFLT8",
            FieldType::SqlFlt4 => "SQLFLT4",
            FieldType::SqlDateTime => "SQLDATETIME",
            FieldType::SqlDate => "SQLDATE",
            FieldType::SqlTime => "SQLTIME",
            FieldType::SqlDateTimeOffset => "SQLDATETIMEOFFSET",
            FieldType::SqlSmallDateTime => match small_datetime {
                SmallDateTimeTag::Legacy => "SQLSMALLDDATETIME",
                SmallDateTimeTag::Corrected => "SQLDATETIM4",
            },
            FieldType::SqlVaryChar => "SQLVARYCHAR",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorOptions {
    #[serde(default)]
    pub small_datetime_tag: SmallDateTimeTag,
}

/// How one field of a record ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTerminatorSpec {
    /// 1-based field id
    pub ordinal: u32,
    pub terminator: String,
    pub max_length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub field: FieldTerminatorSpec,
    pub column: ColumnSpec,
    pub field_type: FieldType,
}

/// Immutable description of a staged file, one entry per column in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadDescriptor {
    delimiter: char,
    entries: Vec<DescriptorEntry>,
    options: DescriptorOptions,
}

impl LoadDescriptor {
    /// Build the descriptor for `columns`, which must be in file field order.
    pub fn build(columns: &[ColumnSpec], delimiter: char, options: DescriptorOptions) -> Result<Self> {
        if columns.is_empty() {
            return Err(LoadError::invalid_config(
                "Cannot build a load descriptor without columns",
            ));
        }

        let last = columns.len() - 1;
        let entries = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let terminator = if idx == last {
                    RECORD_TERMINATOR.to_string()
                } else {
                    delimiter.to_string()
                };
                DescriptorEntry {
                    field: FieldTerminatorSpec {
                        ordinal: idx as u32 + 1,
                        terminator,
                        max_length: MAX_FIELD_LENGTH,
                    },
                    column: column.clone(),
                    field_type: FieldType::for_sql_type(column.sql_type),
                }
            })
            .collect();

        Ok(Self {
            delimiter,
            entries,
            options,
        })
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn entries(&self) -> &[DescriptorEntry] {
        &self.entries
    }

    pub fn column_count(&self) -> usize {
        self.entries.len()
    }

    /// Render the format file.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(256 + self.entries.len() * 160);
        // Writing into a String cannot fail.
        let _ = self.write_xml(&mut xml);
        xml
    }

    fn write_xml(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "<?xml version=\"1.0\" ?>")?;
        writeln!(
            out,
            "<BCPFORMAT xmlns=\"{}\" xmlns:xsi=\"{}\">",
            BULKLOAD_NAMESPACE, XSI_NAMESPACE
        )?;
        writeln!(out, "  <RECORD>")?;
        for entry in &self.entries {
            writeln!(
                out,
                "    <FIELD ID=\"{}\" xsi:type=\"CharTerm\" TERMINATOR=\"{}\" MAX_LENGTH=\"{}\"/>",
                entry.field.ordinal,
                escape_attr(&escape_terminator(&entry.field.terminator)),
                entry.field.max_length
            )?;
        }
        writeln!(out, "  </RECORD>")?;
        writeln!(out, "  <ROW>")?;
        for entry in &self.entries {
            writeln!(
                out,
                "    <COLUMN SOURCE=\"{}\" NAME=\"{}\" xsi:type=\"{}\"/>",
                entry.field.ordinal,
                escape_attr(&entry.column.name),
                entry.field_type.tag(self.options.small_datetime_tag)
            )?;
        }
        writeln!(out, "  </ROW>")?;
        writeln!(out, "</BCPFORMAT>")
    }

    /// Write the format file to `path`.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_xml())
    }
}

/// Terminators are written with backslash escapes for control characters.
fn escape_terminator(terminator: &str) -> String {
    let mut out = String::with_capacity(terminator.len() + 2);
    for ch in terminator.chars() {
        match ch {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
